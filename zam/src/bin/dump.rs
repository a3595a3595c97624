use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use zam::{Context, Image, SectionKind, StreamReader, VmResult, codec};

#[derive(Parser)]
#[command(name = "dump", about = "Print every section of a bytecode image")]
struct Args {
    /// Images to dump, in order.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
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
        for kind in image.sections() {
            println!("Section {}", kind.name());
            match kind {
                SectionKind::Prim | SectionKind::Dlls | SectionKind::Dlpt => {
                    for name in image.strings(kind)? {
                        println!("  {name}");
                    }
                }
                SectionKind::Data | SectionKind::Crcs => {
                    let mut stream =
                        StreamReader::new(image.section(kind)?);
                    let value = codec::read_value(&mut ctx, &mut stream)?;
                    println!("{}", codec::render_value(&ctx, value));
                }
                SectionKind::Code => {
                    println!("  {} words", image.code_words()?.len());
                }
                SectionKind::Dbug | SectionKind::Symb => {}
            }
        }
    }
    Ok(())
}
