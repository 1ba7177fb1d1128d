use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, IntoDiagnostic, Result, Severity};

use ocho::{parse_image, trace_line, Console, Machine, Opcode};

/// Ocho is an emulator and toolchain for the LS-8 8-bit microcomputer.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.ls8` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a text `.ls8` or binary `.bin` image and output to terminal
    Run {
        /// `.ls8` or `.bin` file to run
        name: PathBuf,
        /// Print machine state to stderr before every cycle
        #[arg(short, long)]
        trace: bool,
        /// Stop with an error after this many cycles
        #[arg(short, long)]
        limit: Option<u64>,
    },
    /// Create a binary `.bin` image to run later
    Compile {
        /// `.ls8` file to compile
        name: PathBuf,
        /// Destination to output .bin file
        dest: Option<PathBuf>,
    },
    /// Check a `.ls8` file without running it
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Show the decoded instruction listing of an image
    Dis {
        /// `.ls8` or `.bin` file to list
        name: PathBuf,
    },
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(ocho::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Some(command) = args.command {
        match command {
            Command::Run { name, trace, limit } => run(&name, trace, limit),
            Command::Compile { name, dest } => {
                file_message(Green, "Compiling", &name);
                let image = parse_image(&fs::read_to_string(&name).into_diagnostic()?)?;

                let out_file_name =
                    dest.unwrap_or(name.with_extension("bin").file_name().unwrap().into());
                let mut file = File::create(&out_file_name).into_diagnostic()?;
                file.write_all(&image).into_diagnostic()?;

                message(Green, "Finished", "emit binary");
                file_message(Green, "Saved", &out_file_name);
                Ok(())
            }
            Command::Check { name } => {
                file_message(Green, "Checking", &name);
                let image = parse_image(&fs::read_to_string(&name).into_diagnostic()?)?;
                let _ = Machine::from_image(&image)?;
                message(Green, "Success", "no errors found!");
                Ok(())
            }
            Command::Dis { name } => {
                file_message(Green, "Decoding", &name);
                let image = read_image(&name)?;
                print!("{}", listing(&image));
                Ok(())
            }
        }
    } else if let Some(path) = args.path {
        run(&path, false, None)
    } else {
        println!("\n~ ocho v{VERSION} ~");
        println!("{}", LOGO.truecolor(255, 176, 0).bold());
        println!("{SHORT_INFO}");
        std::process::exit(0);
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &PathBuf) {
    let right = format!("target {}", right.to_str().unwrap());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn run(name: &PathBuf, trace: bool, limit: Option<u64>) -> Result<()> {
    file_message(MsgColor::Green, "Loading", name);
    let image = read_image(name)?;
    let mut machine = Machine::from_image(&image)?;
    message(MsgColor::Green, "Running", "loaded image");

    let mut out = Console;
    let mut cycles: u64 = 0;
    while !machine.halted() {
        if let Some(limit) = limit {
            if cycles >= limit {
                bail!(
                    severity = Severity::Error,
                    code = "run::limit",
                    help = "the program may be stuck in a loop; raise --limit if it needs more cycles",
                    "Cycle limit of {limit} exhausted before HLT",
                );
            }
        }
        if trace {
            eprintln!("{}", trace_line(&machine).dimmed());
        }
        machine.step(&mut out)?;
        cycles += 1;
    }

    println!("\n{:>12}", "Halted".cyan());
    file_message(MsgColor::Green, "Completed", name);
    Ok(())
}

fn read_image(name: &PathBuf) -> Result<Vec<u8>> {
    if let Some(ext) = name.extension() {
        match ext.to_str().unwrap() {
            "bin" => {
                // Raw bytes, already in memory format
                let mut file = File::open(name).into_diagnostic()?;
                let mut buffer = Vec::new();
                file.read_to_end(&mut buffer).into_diagnostic()?;
                Ok(buffer)
            }
            "ls8" => parse_image(&fs::read_to_string(name).into_diagnostic()?),
            _ => {
                bail!("File has unknown extension. Exiting...")
            }
        }
    } else {
        bail!("File has no extension. Exiting...");
    }
}

/// Decoded listing of an image, one line per instruction or data byte.
fn listing(image: &[u8]) -> String {
    use std::fmt::Write as _;

    let mut text = String::new();
    let mut addr = 0;
    while addr < image.len() {
        let byte = image[addr];
        let _ = write!(text, "{addr:02X}  ");
        match Opcode::decode(byte) {
            Some(opcode) if addr + opcode.width() as usize <= image.len() => {
                let operands = &image[addr + 1..addr + opcode.width() as usize];
                match (opcode, operands) {
                    (Opcode::Ldi, [r, v]) => {
                        let _ = writeln!(text, "{opcode} R{r} {v}");
                    }
                    (_, [a, b]) => {
                        let _ = writeln!(text, "{opcode} R{a} R{b}");
                    }
                    (_, [r]) => {
                        let _ = writeln!(text, "{opcode} R{r}");
                    }
                    _ => {
                        let _ = writeln!(text, "{opcode}");
                    }
                }
                addr += opcode.width() as usize;
            }
            _ => {
                // Data, or an instruction truncated by the end of the image
                let _ = writeln!(text, "{byte:08b}");
                addr += 1;
            }
        }
    }
    text
}

const LOGO: &str = r#"
                     oooo
                     `888
 .ooooo.   .ooooo.    888 .oo.    .ooooo.
d88' `88b d88' `"Y8   888P"Y88b  d88' `88b
888   888 888         888   888  888   888
888   888 888   .o8   888   888  888   888
`Y8bod8P' `Y8bod8P'  o888o o888o `Y8bod8P'"#;

const SHORT_INFO: &str = r"
Welcome to ocho, an emulator and toolchain for the LS-8 8-bit microcomputer.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
