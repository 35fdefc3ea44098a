//! Public interface for running code objects.

use std::rc::Rc;

use crate::{
    bytecode::{Code, Vm},
    exception::RunResult,
    io::{PrintWriter, StdPrint},
    namespace::Namespace,
    resource::{NoLimitTracker, ResourceTracker},
    tracer::{NoopTracer, VmTracer},
    value::Value,
};

/// Runs `code` as module-level code against `builtins`.
///
/// The module frame's locals and globals are one fresh, empty scope. Output
/// of `print` goes to stdout. Returns the value captured by the frame's
/// return instruction (`None` if it ran off the end), or the first fault.
///
/// ```ignore
/// let code = Code::from_json(&json)?;
/// let result = framevm::run(code, framevm::default_builtins())?;
/// ```
pub fn run(code: impl Into<Rc<Code>>, builtins: Namespace) -> RunResult<Value> {
    VirtualMachine::new(builtins).run(code)
}

/// A configured virtual machine.
///
/// Holds the built-in scope and the host hooks used for every run: a
/// [`ResourceTracker`] budgeting execution, a [`VmTracer`] observing it and a
/// [`PrintWriter`] receiving `print()` output. Each [`run`](Self::run) starts
/// from a fresh global scope, so runs do not observe one another except
/// through values stored in the shared built-in scope.
///
/// There is no cycle collector. When a run finishes its global scope is
/// cleared, which frees module-level functions; a function that outlives the
/// run sees an empty global scope. Closures defined inside function frames
/// still keep their defining scopes alive.
///
/// # Example
/// ```ignore
/// use framevm::{CodeBuilder, CollectStringPrint, Opcode, VirtualMachine, default_builtins};
///
/// let mut builder = CodeBuilder::new("<module>");
/// builder.load_global("print", true);
/// builder.load_const("hi");
/// builder.emit_arg(Opcode::Call, 1);
/// builder.emit(Opcode::ReturnValue);
/// let code = builder.build()?;
///
/// let mut vm = VirtualMachine::new(default_builtins()).with_print(CollectStringPrint::new());
/// vm.run(code)?;
/// assert_eq!(vm.print().output(), "hi\n");
/// ```
#[derive(Debug)]
pub struct VirtualMachine<T = NoLimitTracker, Tr = NoopTracer, P = StdPrint>
where
    T: ResourceTracker,
    Tr: VmTracer,
    P: PrintWriter,
{
    builtins: Namespace,
    tracker: T,
    tracer: Tr,
    print: P,
}

impl VirtualMachine {
    /// Creates a machine with no resource limits beyond the default recursion
    /// ceiling, no tracing and stdout printing.
    #[must_use]
    pub fn new(builtins: Namespace) -> Self {
        Self {
            builtins,
            tracker: NoLimitTracker,
            tracer: NoopTracer,
            print: StdPrint,
        }
    }
}

impl<T: ResourceTracker, Tr: VmTracer, P: PrintWriter> VirtualMachine<T, Tr, P> {
    /// Replaces the resource tracker.
    #[must_use]
    pub fn with_tracker<T2: ResourceTracker>(self, tracker: T2) -> VirtualMachine<T2, Tr, P> {
        VirtualMachine {
            builtins: self.builtins,
            tracker,
            tracer: self.tracer,
            print: self.print,
        }
    }

    /// Replaces the tracer.
    #[must_use]
    pub fn with_tracer<Tr2: VmTracer>(self, tracer: Tr2) -> VirtualMachine<T, Tr2, P> {
        VirtualMachine {
            builtins: self.builtins,
            tracker: self.tracker,
            tracer,
            print: self.print,
        }
    }

    /// Replaces the print writer.
    #[must_use]
    pub fn with_print<P2: PrintWriter>(self, print: P2) -> VirtualMachine<T, Tr, P2> {
        VirtualMachine {
            builtins: self.builtins,
            tracker: self.tracker,
            tracer: self.tracer,
            print,
        }
    }

    /// Runs `code` as module-level code in a fresh global scope.
    pub fn run(&mut self, code: impl Into<Rc<Code>>) -> RunResult<Value> {
        let mut vm = Vm::new(&mut self.tracker, &mut self.print, &mut self.tracer);
        vm.run_module(code.into(), self.builtins.clone())
    }

    #[must_use]
    pub fn builtins(&self) -> &Namespace {
        &self.builtins
    }

    #[must_use]
    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    #[must_use]
    pub fn tracer(&self) -> &Tr {
        &self.tracer
    }

    pub fn tracer_mut(&mut self) -> &mut Tr {
        &mut self.tracer
    }

    #[must_use]
    pub fn print(&self) -> &P {
        &self.print
    }

    pub fn print_mut(&mut self) -> &mut P {
        &mut self.print
    }

    /// Consumes the machine, returning its tracer.
    #[must_use]
    pub fn into_tracer(self) -> Tr {
        self.tracer
    }
}
