//! Interactive command-line front end for the magpie debugger core.

use std::path::PathBuf;
use std::process::exit;

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use magpie::{
    register_info_by_name, register_infos, Error, Pid, Process, RegisterFormat, RegisterInfo,
    RegisterType, Result, Value, F80,
};

#[derive(Parser)]
#[command(name = "magpie", about = "A ptrace-based debugger for Linux/x86-64")]
struct Cli {
    /// Attach to a running process instead of launching one.
    #[arg(short = 'p', long = "pid", conflicts_with = "path")]
    pid: Option<i32>,

    /// Program to launch under the debugger.
    path: Option<PathBuf>,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let process = if let Some(pid) = cli.pid {
        Process::attach(Pid::from_raw(pid))
    } else if let Some(path) = &cli.path {
        Process::launch(path)
    } else {
        eprintln!("No arguments given");
        exit(-1);
    };

    let mut process = match process {
        Ok(process) => process,
        Err(err) => {
            eprintln!("{err}");
            exit(-1);
        }
    };

    main_loop(&mut process);
}

fn main_loop(process: &mut Process) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("{err}");
            exit(-1);
        }
    };

    let mut last_line = String::new();

    loop {
        let line = match editor.readline("magpie> ") {
            Ok(line) => line,
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(err) => {
                eprintln!("{err}");
                break;
            }
        };

        // An empty line repeats the previous command.
        let line = if line.trim().is_empty() {
            last_line.clone()
        } else {
            let _ = editor.add_history_entry(&line);
            last_line = line.clone();
            line
        };

        if line.trim().is_empty() {
            continue;
        }

        if let Err(err) = handle_command(process, line.trim()) {
            eprintln!("{err}");
        }
    }
}

fn handle_command(process: &mut Process, line: &str) -> Result<()> {
    let args: Vec<&str> = line.split_whitespace().collect();
    let command = args[0];

    if is_prefix(command, "continue") {
        process.resume()?;
        let reason = process.wait_on_signal()?;
        println!("Process {} {}", process.pid(), reason);
    } else if is_prefix(command, "register") {
        handle_register_command(process, &args)?;
    } else if is_prefix(command, "help") {
        print_help(&args);
    } else {
        eprintln!("Unknown command");
    }

    Ok(())
}

fn handle_register_command(process: &mut Process, args: &[&str]) -> Result<()> {
    if args.len() < 2 {
        print_help(&["help", "register"]);
        return Ok(());
    }

    if is_prefix(args[1], "read") {
        handle_register_read(process, args)
    } else if is_prefix(args[1], "write") {
        handle_register_write(process, args)
    } else {
        print_help(&["help", "register"]);
        Ok(())
    }
}

fn handle_register_read(process: &Process, args: &[&str]) -> Result<()> {
    match args {
        [_, _] | [_, _, "all"] => {
            let all = args.len() == 3;
            for info in register_infos() {
                let wanted = (all || info.ty == RegisterType::Gpr) && info.name != "orig_rax";
                if !wanted {
                    continue;
                }
                let value = process.registers().read(info)?;
                println!("{}:\t{}", info.name, format_value(value));
            }
        }
        [_, _, name] => match register_info_by_name(name) {
            Ok(info) => {
                let value = process.registers().read(info)?;
                println!("{}:\t{}", info.name, format_value(value));
            }
            Err(_) => eprintln!("No such register"),
        },
        _ => print_help(&["help", "register"]),
    }

    Ok(())
}

fn handle_register_write(process: &mut Process, args: &[&str]) -> Result<()> {
    let [_, _, name, text] = args else {
        print_help(&["help", "register"]);
        return Ok(());
    };

    let info = register_info_by_name(name)?;
    let value = parse_register_value(info, text)?;
    process.registers_mut().write(info, value)
}

/// Unsigned registers take hex, floating-point registers take decimals,
/// vector registers take `[0xNN,...]` literals of exactly their width.
fn parse_register_value(info: &RegisterInfo, text: &str) -> Result<Value> {
    let parse_error = || Error::Parse { what: "register value", text: text.to_owned() };

    let value = match info.format {
        RegisterFormat::Uint => {
            let digits = text.strip_prefix("0x").unwrap_or(text);
            match info.size {
                1 => Value::U8(u8::from_str_radix(digits, 16).map_err(|_| parse_error())?),
                2 => Value::U16(u16::from_str_radix(digits, 16).map_err(|_| parse_error())?),
                4 => Value::U32(u32::from_str_radix(digits, 16).map_err(|_| parse_error())?),
                8 => Value::U64(u64::from_str_radix(digits, 16).map_err(|_| parse_error())?),
                size => return Err(Error::UnexpectedRegisterSize { size }),
            }
        }
        RegisterFormat::DoubleFloat => Value::F64(text.parse().map_err(|_| parse_error())?),
        RegisterFormat::LongDouble => {
            Value::F80(F80::from_f64(text.parse().map_err(|_| parse_error())?))
        }
        RegisterFormat::Vector => match info.size {
            8 => Value::Bytes8(parse_vector::<8>(text)?),
            16 => Value::Bytes16(parse_vector::<16>(text)?),
            size => return Err(Error::UnexpectedRegisterSize { size }),
        },
    };

    Ok(value)
}

fn parse_vector<const N: usize>(text: &str) -> Result<[u8; N]> {
    let parse_error = || Error::Parse { what: "vector literal", text: text.to_owned() };

    let inner = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(parse_error)?;

    let mut out = [0u8; N];
    let mut lanes = 0;
    for (slot, lane) in inner.split(',').enumerate() {
        let lane = lane.trim();
        let digits = lane.strip_prefix("0x").unwrap_or(lane);
        *out.get_mut(slot).ok_or_else(parse_error)? =
            u8::from_str_radix(digits, 16).map_err(|_| parse_error())?;
        lanes = slot + 1;
    }
    if lanes != N {
        return Err(parse_error());
    }

    Ok(out)
}

fn format_value(value: Value) -> String {
    match value {
        Value::U8(v) => format!("{v:#04x}"),
        Value::U16(v) => format!("{v:#06x}"),
        Value::U32(v) => format!("{v:#010x}"),
        Value::U64(v) => format!("{v:#018x}"),
        Value::I8(v) => format!("{v}"),
        Value::I16(v) => format!("{v}"),
        Value::I32(v) => format!("{v}"),
        Value::I64(v) => format!("{v}"),
        Value::F32(v) => format!("{v}"),
        Value::F64(v) => format!("{v}"),
        Value::F80(v) => format!("{v}"),
        Value::Bytes8(bytes) => format_vector(&bytes),
        Value::Bytes16(bytes) => format_vector(&bytes),
    }
}

fn format_vector(bytes: &[u8]) -> String {
    let lanes: Vec<String> = bytes.iter().map(|b| format!("{b:#04x}")).collect();
    format!("[{}]", lanes.join(","))
}

fn is_prefix(prefix: &str, of: &str) -> bool {
    of.starts_with(prefix)
}

fn print_help(args: &[&str]) {
    if args.len() == 1 {
        eprintln!(
            "Available commands:
continue    - Resume the process
register    - Commands for operating on registers"
        );
    } else if is_prefix(args[1], "register") {
        eprintln!(
            "Available commands:
read
read <register>
read all
write <register> <value>"
        );
    } else {
        eprintln!("No help available on that");
    }
}
