use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use zam::{Context, Image, UNIT, VmResult, codec};

#[derive(Parser)]
#[command(name = "zam", about = "Run bytecode images")]
struct Args {
    /// Log every executed instruction.
    #[arg(long)]
    trace: bool,

    /// Images to execute, in order.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let mut builder = env_logger::Builder::from_default_env();
    if args.trace {
        builder.filter_level(log::LevelFilter::Trace);
    }
    builder.init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> VmResult<()> {
    for path in &args.images {
        let image = Image::open(path)?;
        let mut ctx = Context::new()?;
        let result = ctx.run(&image)?;
        if result != UNIT {
            eprintln!("{}", codec::render_value(&ctx, result));
        }
    }
    Ok(())
}
