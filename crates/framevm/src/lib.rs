#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is checked")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts are intentional")]
#![expect(clippy::cast_possible_wrap, reason = "wrap behavior mirrors CPython")]
#![expect(clippy::needless_pass_by_value, reason = "call APIs pass values consistently")]
#![expect(clippy::float_cmp, reason = "Python equality requires exact float comparison")]
mod args;
mod builtins;
mod bytecode;
mod exception;
mod function;
mod io;
mod namespace;
mod operators;
mod resource;
mod run;
mod signature;
pub mod tracer;
mod types;
mod value;

pub use crate::{
    args::ArgValues,
    builtins::{NativeFunction, default_builtins},
    bytecode::{Arg, BinaryOp, Code, CodeBuilder, CodeDef, CompareOp, Const, Instruction, JumpLabel, Opcode},
    exception::{BindError, Fault, LoadError, RunResult},
    function::{Defaults, Function},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    namespace::Namespace,
    resource::{
        DEFAULT_MAX_RECURSION_DEPTH, LimitedTracker, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker,
    },
    run::{VirtualMachine, run},
    signature::Signature,
    tracer::{
        CoverageTracer, NoopTracer, ProfilingReport, ProfilingTracer, RecordingTracer, StderrTracer, TraceEvent,
        VmTracer,
    },
    types::{BoundMethod, Dict, MethodKind, Range, Set, Slice, ValueIter},
    value::{ConversionError, HashKey, Value},
};
