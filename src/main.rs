//! `popi` command line: compile and run a program, or inspect it.
//!
//! Usage: `popi [FILE] [-e SRC] [--tokens] [--bc] [--emit OUT] [--stack]`

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use popi::bytecode::disasm::print_bc;
use popi::frontend::token_dumper::TokenDumper;
use popi::{ByteCode, Image, Lexer, Vm, VmConfig};

/// Extension of serialized bytecode images.
const IMAGE_EXTENSION: &str = "popc";

#[derive(Parser, Debug)]
#[command(name = "popi")]
#[command(about = "Compile and run popi programs on the bytecode VM")]
struct Args {
    /// Source file, or a compiled `.popc` image
    file: Option<PathBuf>,

    /// Inline source to run instead of a file
    #[arg(short = 'e', long = "eval", conflicts_with = "file")]
    eval: Option<String>,

    /// Print the token stream and stop
    #[arg(long)]
    tokens: bool,

    /// Disable colors in token output
    #[arg(long = "no-color")]
    no_color: bool,

    /// Print tokens by spelling instead of their debug form
    #[arg(long)]
    pretty: bool,

    /// Print a disassembly before running
    #[arg(long)]
    bc: bool,

    /// Write a compiled image to this path instead of running
    #[arg(long)]
    emit: Option<PathBuf>,

    /// Print every value left on the stack, top first
    #[arg(long)]
    stack: bool,

    /// Abort after this many instructions
    #[arg(long = "max-steps")]
    max_steps: Option<usize>,

    /// Maximum nesting of function calls
    #[arg(long = "max-call-depth", default_value_t = VmConfig::default().max_call_depth)]
    max_call_depth: usize,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn main() {
    init_logging();

    let args = Args::parse();

    let code = match (&args.file, &args.eval) {
        (_, Some(source)) => compile_source(source, &args),
        (Some(path), None) if is_image(path) => load_image(path),
        (Some(path), None) => {
            let source = fs::read_to_string(path).unwrap_or_else(|e| {
                error!("Failed to read '{}': {}", path.display(), e);
                process::exit(1);
            });
            compile_source(&source, &args)
        }
        (None, None) => {
            error!("no input: pass a FILE or --eval SRC (see --help)");
            process::exit(1);
        }
    };

    if args.bc {
        print_bc(&code);
    }

    if let Some(out) = &args.emit {
        write_image(out, code);
        return;
    }

    run(code, &args);
}

fn is_image(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(IMAGE_EXTENSION)
}

/// Compiles `source`; with `--tokens` dumps the token stream and exits.
fn compile_source(source: &str, args: &Args) -> ByteCode {
    if args.tokens {
        dump_tokens(source, args.no_color, args.pretty);
        process::exit(0);
    }

    popi::compile(source).unwrap_or_else(|e| {
        error!("{}", e);
        process::exit(1);
    })
}

fn dump_tokens(source: &str, no_color: bool, pretty: bool) {
    let mut lexer = Lexer::new(source);

    match lexer.tokenize() {
        Ok(tokens) => {
            let mut dumper = TokenDumper::new();
            if no_color {
                dumper = dumper.no_color();
            }
            if pretty {
                dumper = dumper.pretty();
            }
            dumper.dump(&tokens);
        }
        Err(e) => {
            error!("lexical error: {}", e);
            process::exit(1);
        }
    }
}

fn load_image(path: &Path) -> ByteCode {
    let bytes = fs::read(path).unwrap_or_else(|e| {
        error!("Failed to read '{}': {}", path.display(), e);
        process::exit(1);
    });

    match Image::from_bytes(&bytes) {
        Ok(image) => image.into_code(),
        Err(e) => {
            error!("'{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}

fn write_image(out: &Path, code: ByteCode) {
    let bytes = match Image::new(code).to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    if let Err(e) = fs::write(out, &bytes) {
        error!("Failed to write {}: {}", out.display(), e);
        process::exit(1);
    }
    info!("wrote {} bytes to {}", bytes.len(), out.display());
}

fn run(code: ByteCode, args: &Args) {
    let config = VmConfig {
        max_steps: args.max_steps,
        max_call_depth: args.max_call_depth,
        ..VmConfig::default()
    };

    let mut vm = Vm::with_config(code, config);
    if let Err(e) = vm.exec() {
        error!("{}", e);
        process::exit(1);
    }

    if args.stack {
        while let Some(value) = vm.pop() {
            println!("{}", value);
        }
    } else if let Some(value) = vm.pop() {
        println!("{}", value);
    }
}
