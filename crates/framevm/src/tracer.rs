//! VM execution tracing.
//!
//! The [`VmTracer`] trait defines hook points at key execution events
//! (instruction dispatch, frame push/pop, closure scope lookups, function
//! creation, faults). The VM carries the tracer as a type parameter, so with
//! [`NoopTracer`] every hook is monomorphized away.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | No-op (default) |
//! | [`StderrTracer`] | Human-readable execution log to stderr |
//! | [`ProfilingTracer`] | Opcode frequency counters and call depth tracking |
//! | [`CoverageTracer`] | Instruction offset coverage |
//! | [`RecordingTracer`] | Full event recording for post-mortem analysis |
//!
//! ```ignore
//! let mut vm = VirtualMachine::new(default_builtins()).with_tracer(ProfilingTracer::new());
//! vm.run(code)?;
//! println!("{}", vm.tracer().report());
//! ```

use ahash::{AHashMap, AHashSet};

use crate::{bytecode::Opcode, exception::Fault};

/// Trace event emitted during VM execution.
///
/// Used by [`RecordingTracer`] to capture a full execution trace.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    /// An instruction was dispatched.
    Instruction {
        /// Byte offset of the instruction within its code object.
        offset: u32,
        /// The opcode that was executed.
        opcode: Opcode,
        /// Operand stack depth at the time of dispatch.
        stack_depth: usize,
    },
    /// A call pushed a new frame.
    Call {
        /// Name of the code object the frame executes.
        name: String,
        /// Frame stack depth after the push.
        depth: usize,
    },
    /// A frame finished and was popped.
    Return {
        /// Frame stack depth after the pop.
        depth: usize,
    },
    /// `LOAD_DEREF` resolved a name.
    DerefLoad {
        name: String,
        /// Whether the name came from the live defining scope rather than the frame's own locals.
        from_defining_scope: bool,
    },
    /// A function object was created.
    MakeFunction {
        /// Number of positional default values.
        defaults_count: usize,
        /// Number of keyword-only default values.
        kwdefaults_count: usize,
    },
    /// A fault aborted execution.
    Fault {
        /// Fault kind, e.g. `"TypeMismatch"`.
        kind: &'static str,
    },
}

/// Trait for VM execution tracing.
///
/// All methods have default no-op implementations; implementations only
/// override the hooks they care about.
pub trait VmTracer: std::fmt::Debug {
    /// Called before each instruction dispatch in the main execution loop.
    ///
    /// This is the hottest hook, called for every instruction.
    ///
    /// # Arguments
    /// * `offset` - Byte offset of the instruction in its code object
    /// * `opcode` - The opcode about to be executed
    /// * `stack_depth` - Number of values on the current frame's operand stack
    /// * `frame_depth` - Number of frames on the frame stack, including the current one
    #[inline(always)]
    fn on_instruction(&mut self, _offset: u32, _opcode: Opcode, _stack_depth: usize, _frame_depth: usize) {}

    /// Called when a new frame is pushed, starting with the module frame at depth 1.
    ///
    /// # Arguments
    /// * `name` - Name of the code object
    /// * `depth` - Frame stack depth after the push
    #[inline(always)]
    fn on_call(&mut self, _name: &str, _depth: usize) {}

    /// Called when a frame finishes.
    ///
    /// # Arguments
    /// * `depth` - Frame stack depth after the pop
    #[inline(always)]
    fn on_return(&mut self, _depth: usize) {}

    /// Called when `LOAD_DEREF` resolves a name.
    #[inline(always)]
    fn on_deref_load(&mut self, _name: &str, _from_defining_scope: bool) {}

    /// Called when a function object is created.
    #[inline(always)]
    fn on_make_function(&mut self, _defaults_count: usize, _kwdefaults_count: usize) {}

    /// Called once when a fault aborts execution, before it unwinds to the host.
    #[inline(always)]
    fn on_fault(&mut self, _fault: &Fault) {}
}

impl<T: VmTracer> VmTracer for &mut T {
    fn on_instruction(&mut self, offset: u32, opcode: Opcode, stack_depth: usize, frame_depth: usize) {
        (**self).on_instruction(offset, opcode, stack_depth, frame_depth);
    }

    fn on_call(&mut self, name: &str, depth: usize) {
        (**self).on_call(name, depth);
    }

    fn on_return(&mut self, depth: usize) {
        (**self).on_return(depth);
    }

    fn on_deref_load(&mut self, name: &str, from_defining_scope: bool) {
        (**self).on_deref_load(name, from_defining_scope);
    }

    fn on_make_function(&mut self, defaults_count: usize, kwdefaults_count: usize) {
        (**self).on_make_function(defaults_count, kwdefaults_count);
    }

    fn on_fault(&mut self, fault: &Fault) {
        (**self).on_fault(fault);
    }
}

// ============================================================================
// NoopTracer
// ============================================================================

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

// ============================================================================
// StderrTracer
// ============================================================================

/// Tracer that prints a human-readable execution log to stderr.
///
/// Output format:
/// ```text
/// [    0] LOAD_CONST            stack=0  frames=1
/// [    2] STORE_NAME            stack=1  frames=1
///   >>> CALL f                    depth=2
/// [    0] LOAD_FAST             stack=0  frames=2
///   <<< RETURN                    depth=1
/// ```
#[derive(Debug, Default)]
pub struct StderrTracer {
    /// Maximum number of instructions to trace before going quiet. None = unlimited.
    limit: Option<usize>,
    count: usize,
    stopped: bool,
}

impl StderrTracer {
    /// Creates a new stderr tracer with no instruction limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new stderr tracer that stops after `limit` instructions.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

impl VmTracer for StderrTracer {
    #[inline]
    fn on_instruction(&mut self, offset: u32, opcode: Opcode, stack_depth: usize, frame_depth: usize) {
        if self.stopped {
            return;
        }
        let name: &'static str = opcode.into();
        eprintln!("[{offset:>5}] {name:<21} stack={stack_depth}  frames={frame_depth}");
        self.count += 1;
        if let Some(limit) = self.limit
            && self.count >= limit
        {
            eprintln!("--- trace limit reached ({limit} instructions) ---");
            self.stopped = true;
        }
    }

    fn on_call(&mut self, name: &str, depth: usize) {
        if self.stopped {
            return;
        }
        eprintln!("  >>> CALL {name:<20} depth={depth}");
    }

    fn on_return(&mut self, depth: usize) {
        if self.stopped {
            return;
        }
        eprintln!("  <<< RETURN                    depth={depth}");
    }

    fn on_deref_load(&mut self, name: &str, from_defining_scope: bool) {
        if self.stopped {
            return;
        }
        let source = if from_defining_scope { "defining scope" } else { "locals" };
        eprintln!("  ... DEREF {name} from {source}");
    }

    fn on_make_function(&mut self, defaults_count: usize, kwdefaults_count: usize) {
        if self.stopped {
            return;
        }
        eprintln!("  +++ MAKE FUNCTION defaults={defaults_count} kwdefaults={kwdefaults_count}");
    }

    fn on_fault(&mut self, fault: &Fault) {
        eprintln!("  !!! FAULT {fault}");
    }
}

// ============================================================================
// ProfilingTracer
// ============================================================================

/// Tracer that collects execution statistics.
///
/// Retrieve results via [`ProfilingTracer::report`] after execution.
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    opcode_counts: AHashMap<Opcode, u64>,
    total_instructions: u64,
    max_depth: usize,
    total_calls: u64,
    total_deref_loads: u64,
    functions_created: u64,
}

/// Summary report from a profiling trace.
#[derive(Debug)]
pub struct ProfilingReport {
    /// Per-opcode execution counts, sorted by frequency (highest first).
    pub opcode_counts: Vec<(Opcode, u64)>,
    /// Total instructions executed.
    pub total_instructions: u64,
    /// Maximum frame stack depth observed.
    pub max_depth: usize,
    /// Total number of frames pushed, including the root frame.
    pub total_calls: u64,
    /// Total number of `LOAD_DEREF` lookups.
    pub total_deref_loads: u64,
    /// Total number of function objects created.
    pub functions_created: u64,
}

impl ProfilingTracer {
    /// Creates a new profiling tracer with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a profiling report from the collected data.
    ///
    /// Opcode counts are sorted by frequency (most executed first), ties by name.
    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        let mut opcode_counts: Vec<_> = self.opcode_counts.iter().map(|(&k, &v)| (k, v)).collect();
        opcode_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ProfilingReport {
            opcode_counts,
            total_instructions: self.total_instructions,
            max_depth: self.max_depth,
            total_calls: self.total_calls,
            total_deref_loads: self.total_deref_loads,
            functions_created: self.functions_created,
        }
    }
}

impl VmTracer for ProfilingTracer {
    #[inline]
    fn on_instruction(&mut self, _offset: u32, opcode: Opcode, _stack_depth: usize, _frame_depth: usize) {
        *self.opcode_counts.entry(opcode).or_insert(0) += 1;
        self.total_instructions += 1;
    }

    #[inline]
    fn on_call(&mut self, _name: &str, depth: usize) {
        self.total_calls += 1;
        self.max_depth = self.max_depth.max(depth);
    }

    fn on_deref_load(&mut self, _name: &str, _from_defining_scope: bool) {
        self.total_deref_loads += 1;
    }

    fn on_make_function(&mut self, _defaults_count: usize, _kwdefaults_count: usize) {
        self.functions_created += 1;
    }
}

impl std::fmt::Display for ProfilingReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== VM Profiling Report ===")?;
        writeln!(f, "Total instructions: {}", self.total_instructions)?;
        writeln!(f, "Total calls:        {}", self.total_calls)?;
        writeln!(f, "Max call depth:     {}", self.max_depth)?;
        writeln!(f, "Deref loads:        {}", self.total_deref_loads)?;
        writeln!(f, "Functions created:  {}", self.functions_created)?;
        writeln!(f)?;
        writeln!(f, "--- Opcode Frequency ---")?;
        for (opcode, count) in &self.opcode_counts {
            let pct = (*count as f64 / self.total_instructions as f64) * 100.0;
            let name: &'static str = (*opcode).into();
            writeln!(f, "  {name:<24} {count:>10}  ({pct:>5.1}%)")?;
        }
        Ok(())
    }
}

// ============================================================================
// CoverageTracer
// ============================================================================

/// Tracer that records which instruction offsets were executed.
///
/// Offsets are recorded per code object name, so functions sharing offsets
/// with the module body are kept apart.
#[derive(Debug, Default)]
pub struct CoverageTracer {
    /// Name of the code object executing in each active frame.
    names: Vec<String>,
    covered: AHashMap<String, AHashSet<u32>>,
}

impl CoverageTracer {
    /// Creates a new coverage tracer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the offsets executed within the code object called `name`.
    #[must_use]
    pub fn covered_offsets(&self, name: &str) -> Option<&AHashSet<u32>> {
        self.covered.get(name)
    }

    /// Returns the number of unique (code object, offset) pairs executed.
    #[must_use]
    pub fn coverage_count(&self) -> usize {
        self.covered.values().map(|offsets| offsets.len()).sum()
    }
}

impl VmTracer for CoverageTracer {
    #[inline]
    fn on_instruction(&mut self, offset: u32, _opcode: Opcode, _stack_depth: usize, _frame_depth: usize) {
        let name = self.names.last().map_or("", String::as_str);
        if let Some(offsets) = self.covered.get_mut(name) {
            offsets.insert(offset);
        } else {
            self.covered.insert(name.to_owned(), AHashSet::from_iter([offset]));
        }
    }

    fn on_call(&mut self, name: &str, _depth: usize) {
        self.names.push(name.to_owned());
    }

    fn on_return(&mut self, _depth: usize) {
        self.names.pop();
    }
}

// ============================================================================
// RecordingTracer
// ============================================================================

/// Tracer that records all events for post-mortem analysis.
///
/// Allocates per event, so use it for short executions.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
    /// Optional limit on number of events recorded.
    limit: Option<usize>,
}

impl RecordingTracer {
    /// Creates a new recording tracer with no event limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new recording tracer that stops recording after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Vec::with_capacity(limit.min(1024)),
            limit: Some(limit),
        }
    }

    /// Returns the recorded events.
    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Consumes the tracer and returns the recorded events.
    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    fn record(&mut self, event: TraceEvent) {
        if self.limit.is_some_and(|l| self.events.len() >= l) {
            return;
        }
        self.events.push(event);
    }
}

impl VmTracer for RecordingTracer {
    #[inline]
    fn on_instruction(&mut self, offset: u32, opcode: Opcode, stack_depth: usize, _frame_depth: usize) {
        self.record(TraceEvent::Instruction {
            offset,
            opcode,
            stack_depth,
        });
    }

    fn on_call(&mut self, name: &str, depth: usize) {
        self.record(TraceEvent::Call {
            name: name.to_owned(),
            depth,
        });
    }

    fn on_return(&mut self, depth: usize) {
        self.record(TraceEvent::Return { depth });
    }

    fn on_deref_load(&mut self, name: &str, from_defining_scope: bool) {
        self.record(TraceEvent::DerefLoad {
            name: name.to_owned(),
            from_defining_scope,
        });
    }

    fn on_make_function(&mut self, defaults_count: usize, kwdefaults_count: usize) {
        self.record(TraceEvent::MakeFunction {
            defaults_count,
            kwdefaults_count,
        });
    }

    fn on_fault(&mut self, fault: &Fault) {
        self.record(TraceEvent::Fault { kind: fault.kind() });
    }
}
