//! `reloop` — outline loops into dispatcher-driven functions.
//!
//! Modules travel as JSON (the IR serializes with serde). `extract` runs the
//! transform pipeline, `run` executes a function through the reference
//! interpreter, and `demo` shows the transformation on a built-in example.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use reloop_core::interp::{Interp, Value};
use reloop_core::ir::builder::{FunctionBuilder, ModuleBuilder};
use reloop_core::ir::{CmpKind, FunctionSig, Module, Type, Visibility};
use reloop_core::pipeline::{
    default_pipeline, CapturePassing, DebugConfig, PassConfig, VALID_PASS_NAMES,
};

#[derive(Parser)]
#[command(name = "reloop", version, about = "Loop outlining over a block-based IR")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Emit {
    Json,
    Ir,
}

#[derive(Subcommand)]
enum Command {
    /// Run the transform pipeline over a module.
    Extract {
        /// Input module (JSON).
        input: PathBuf,
        /// Output path; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output format.
        #[arg(long, value_enum, default_value = "json")]
        emit: Emit,
        /// Skip a pass by name (repeatable).
        #[arg(long = "skip-pass")]
        skip_pass: Vec<String>,
        /// How captured values reach the extracted body.
        #[arg(long, default_value = "self-converting")]
        capture_passing: CapturePassing,
        /// Repeat the pipeline until no pass reports changes.
        #[arg(long)]
        fixpoint: bool,
        /// Stop after the named pass and dump IR ("input" dumps the
        /// untransformed module).
        #[arg(long)]
        dump_ir_after: Option<String>,
        /// Restrict IR dumps to functions whose name contains this string.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Execute a function through the reference interpreter.
    Run {
        /// Input module (JSON).
        input: PathBuf,
        /// Function to call.
        function: String,
        /// Arguments: integers, floats, or `true`/`false`.
        args: Vec<String>,
    },
    /// Print a small example module before and after extraction.
    Demo,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Extract {
            input,
            output,
            emit,
            skip_pass,
            capture_passing,
            fixpoint,
            dump_ir_after,
            filter,
        } => extract(
            input,
            output,
            emit,
            skip_pass,
            capture_passing,
            fixpoint,
            dump_ir_after,
            filter,
        ),
        Command::Run {
            input,
            function,
            args,
        } => run(input, &function, &args),
        Command::Demo => {
            demo();
            Ok(())
        }
    }
}

fn load_module(path: &PathBuf) -> Result<Module> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let module: Module = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))?;
    module.validate_symbols()?;
    Ok(module)
}

#[allow(clippy::too_many_arguments)]
fn extract(
    input: PathBuf,
    output: Option<PathBuf>,
    emit: Emit,
    skip_pass: Vec<String>,
    capture_passing: CapturePassing,
    fixpoint: bool,
    dump_ir_after: Option<String>,
    filter: Option<String>,
) -> Result<()> {
    if let Some(pass) = dump_ir_after.as_deref() {
        if !VALID_PASS_NAMES.contains(&pass) {
            bail!(
                "unknown pass `{pass}` for --dump-ir-after (expected one of: {})",
                VALID_PASS_NAMES.join(", ")
            );
        }
    }

    let module = load_module(&input)?;

    let skips: Vec<&str> = skip_pass.iter().map(String::as_str).collect();
    let mut config = PassConfig::from_skip_list(&skips);
    config.capture_passing = capture_passing;
    config.fixpoint = fixpoint;

    let debug = DebugConfig {
        function_filter: filter,
        dump_ir_after: dump_ir_after.clone(),
    };

    let pipeline = default_pipeline(&config);
    let result = pipeline.run_with_debug(module, &debug)?;
    if result.stopped_early {
        return Ok(());
    }
    if dump_ir_after.is_some() {
        eprintln!("warning: --dump-ir-after named a pass that did not run");
    }

    let mut out: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };
    match emit {
        Emit::Json => {
            serde_json::to_writer_pretty(&mut out, &result.module)?;
            writeln!(out)?;
        }
        Emit::Ir => write!(out, "{}", result.module)?,
    }
    Ok(())
}

fn run(input: PathBuf, function: &str, args: &[String]) -> Result<()> {
    let module = load_module(&input)?;
    let values = args
        .iter()
        .map(|a| parse_value(a))
        .collect::<Result<Vec<_>>>()?;

    let mut interp = Interp::new(&module);
    let result = interp.run(function, &values)?;
    println!("{}", format_value(&result));
    for value in interp.trace() {
        println!("record: {}", format_value(value));
    }
    Ok(())
}

fn parse_value(text: &str) -> Result<Value> {
    if text == "true" {
        return Ok(Value::Bool(true));
    }
    if text == "false" {
        return Ok(Value::Bool(false));
    }
    if text.contains('.') {
        return Ok(Value::Float(text.parse()?));
    }
    Ok(Value::Int(
        text.parse().with_context(|| format!("bad argument `{text}`"))?,
    ))
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Unit => "()".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(x) => x.to_string(),
        Value::Ptr(p) => format!("ptr#{p}"),
        Value::Func(name) => format!("@{name}"),
        Value::Captures(h) => format!("captures#{h}"),
    }
}

/// Sum 1..=n with the counter and accumulator carried through block params:
/// loop-demote lowers them to memory, loop-extract outlines the loop.
fn demo_module() -> Module {
    let mut mb = ModuleBuilder::new("demo");
    let sig = FunctionSig {
        params: vec![Type::Int(64)],
        return_ty: Type::Int(64),
        ..Default::default()
    };
    let mut fb = FunctionBuilder::new("sum_to", sig, Visibility::Public);
    let n = fb.param(0);
    let (head, head_vals) = fb.create_block_with_params(&[Type::Int(64), Type::Int(64)]);
    let body = fb.create_block();
    let done = fb.create_block();

    let zero = fb.const_int(0);
    let one = fb.const_int(1);
    fb.br(head, &[one, zero]);

    fb.switch_to_block(head);
    let (i, acc) = (head_vals[0], head_vals[1]);
    let c = fb.cmp(CmpKind::Le, i, n);
    fb.br_if(c, body, &[], done, &[]);

    fb.switch_to_block(body);
    let acc2 = fb.add(acc, i);
    let i2 = fb.add(i, one);
    fb.br(head, &[i2, acc2]);

    fb.switch_to_block(done);
    fb.ret(Some(acc));
    mb.add_function(fb.build());
    mb.build()
}

fn demo() {
    let module = demo_module();
    println!("==== before ====");
    print!("{module}");

    let transformed = default_pipeline(&PassConfig::default())
        .run(module.clone())
        .expect("demo module is well-formed");
    println!("\n==== after ====");
    print!("{transformed}");

    let mut before = Interp::new(&module);
    let mut after = Interp::new(&transformed);
    let args = [Value::Int(10)];
    println!(
        "\nsum_to(10): before = {}, after = {}",
        format_value(&before.run("sum_to", &args).expect("runs")),
        format_value(&after.run("sum_to", &args).expect("runs")),
    );
}
