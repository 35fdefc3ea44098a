use std::{env, fs, process::ExitCode, time::Instant};

use framevm::{
    Code, LimitedTracker, ProfilingTracer, ResourceLimits, StderrTracer, VirtualMachine, VmTracer, default_builtins,
};

const USAGE: &str = "usage: framevm [--trace] [--profile] [--dis] [--max-ops N] <code.json | code.bin>";

#[derive(Debug, Default)]
struct Options {
    path: Option<String>,
    trace: bool,
    profile: bool,
    disassemble: bool,
    max_ops: Option<usize>,
}

fn main() -> ExitCode {
    let options = match parse_args(env::args().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("error: {err}\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };
    let Some(path) = options.path.as_deref() else {
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    };
    let code = match read_code(path) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if options.disassemble {
        print!("{}", code.disassemble());
        for (opcode, count) in code.count_operations() {
            eprintln!("{:<28} {count}", opcode.to_string());
        }
        return ExitCode::SUCCESS;
    }

    let mut limits = ResourceLimits::new();
    if let Some(max_ops) = options.max_ops {
        limits = limits.max_operations(max_ops);
    }
    let mut vm = VirtualMachine::new(default_builtins()).with_tracker(LimitedTracker::new(limits));

    if options.profile {
        let mut vm = vm.with_tracer(ProfilingTracer::new());
        let status = execute(&mut vm, code);
        eprintln!("{}", vm.tracer().report());
        status
    } else if options.trace {
        execute(&mut vm.with_tracer(StderrTracer::new()), code)
    } else {
        execute(&mut vm, code)
    }
}

fn execute<Tr: VmTracer>(vm: &mut VirtualMachine<LimitedTracker, Tr>, code: Code) -> ExitCode {
    let start = Instant::now();
    let result = vm.run(code);
    let elapsed = start.elapsed();
    match result {
        Ok(value) => {
            eprintln!("success after: {elapsed:?}");
            println!("{}", value.py_repr());
            ExitCode::SUCCESS
        }
        Err(fault) => {
            eprintln!("error after: {elapsed:?}\n{fault}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--trace" => options.trace = true,
            "--profile" => options.profile = true,
            "--dis" => options.disassemble = true,
            "--max-ops" => {
                let value = args.next().ok_or("--max-ops needs a value")?;
                let max_ops = value
                    .parse()
                    .map_err(|err| format!("invalid --max-ops value '{value}': {err}"))?;
                options.max_ops = Some(max_ops);
            }
            flag if flag.starts_with("--") => return Err(format!("unknown option '{flag}'")),
            _ if options.path.is_some() => return Err(format!("unexpected argument '{arg}'")),
            _ => options.path = Some(arg),
        }
    }
    Ok(options)
}

/// Loads a code object: postcard for `.bin` files, JSON otherwise.
fn read_code(path: &str) -> Result<Code, String> {
    eprintln!("Reading file: {path}");
    if path.ends_with(".bin") {
        let bytes = fs::read(path).map_err(|err| format!("reading {path}: {err}"))?;
        Code::load(&bytes).map_err(|err| format!("loading {path}: {err}"))
    } else {
        let json = fs::read_to_string(path).map_err(|err| format!("reading {path}: {err}"))?;
        Code::from_json(&json).map_err(|err| format!("loading {path}: {err}"))
    }
}
