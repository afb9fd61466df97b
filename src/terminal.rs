//! Line-oriented command shell over [`MjolnFs`], one command per facade call.

use super::*;

use std::io::{self, Write};
use std::str::FromStr;
use thiserror::Error;

pub const HELP: &str = "\
mk <name> <data>      create a file
update <name> <data>  replace a file's contents
append <name> <data>  add data to the end of a file
touch <name>          create an empty file
rm <name>             delete a file
ls                    list files
read <name>           print a file
stat <name>           show where a file is stored
info                  file system report
storeuse              storage usage in percent
storeusebytes         storage usage in bytes
delpart               erase the device and format it
wipe                  erase the device, leave it unformatted
exit                  leave the shell";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Make { name: String, data: String },
    Update { name: String, data: String },
    Append { name: String, data: String },
    Touch(String),
    Remove(String),
    List,
    Read(String),
    Stat(String),
    Info,
    DeletePartition,
    Wipe,
    StorageUse,
    StorageUseBytes,
    Help,
    Exit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command.")]
    Unknown,
    #[error("Usage: {0}")]
    Usage(&'static str),
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let cmd = match word {
            "mk" => {
                let (name, data) = name_and_data(rest, "mk <filename> <data>")?;
                Command::Make { name, data }
            }
            "update" => {
                let (name, data) = name_and_data(rest, "update <filename> <data>")?;
                Command::Update { name, data }
            }
            "append" => {
                let (name, data) = name_and_data(rest, "append <filename> <data>")?;
                Command::Append { name, data }
            }
            "touch" => Command::Touch(name_only(rest, "touch <filename>")?),
            "rm" => Command::Remove(name_only(rest, "rm <filename>")?),
            "read" => Command::Read(name_only(rest, "read <filename>")?),
            "stat" => Command::Stat(name_only(rest, "stat <filename>")?),
            "ls" if rest.is_empty() => Command::List,
            "info" if rest.is_empty() => Command::Info,
            "delpart" if rest.is_empty() => Command::DeletePartition,
            "wipe" if rest.is_empty() => Command::Wipe,
            "storeuse" if rest.is_empty() => Command::StorageUse,
            "storeusebytes" if rest.is_empty() => Command::StorageUseBytes,
            "help" if rest.is_empty() => Command::Help,
            "exit" if rest.is_empty() => Command::Exit,
            _ => return Err(ParseError::Unknown),
        };
        Ok(cmd)
    }
}

fn name_only(rest: &str, usage: &'static str) -> std::result::Result<String, ParseError> {
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        return Err(ParseError::Usage(usage));
    }
    Ok(rest.to_string())
}

fn name_and_data(rest: &str, usage: &'static str) -> std::result::Result<(String, String), ParseError> {
    let (name, data) = rest
        .split_once(char::is_whitespace)
        .ok_or(ParseError::Usage(usage))?;
    let data = data.trim();
    if name.is_empty() || data.is_empty() {
        return Err(ParseError::Usage(usage));
    }
    Ok((name.to_string(), data.to_string()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Run one command, writing its reply to `out`. File system errors are part
/// of the reply; only failures to write `out` are returned.
pub fn execute(fs: &mut MjolnFs, cmd: &Command, out: &mut impl Write) -> io::Result<Flow> {
    match cmd {
        Command::Make { name, data } => {
            reply(out, fs.write_file(name, data.as_bytes()), "File created.")?
        }
        Command::Update { name, data } => {
            reply(out, fs.update_file(name, data.as_bytes()), "File updated.")?
        }
        Command::Append { name, data } => {
            reply(out, fs.append_file(name, data.as_bytes()), "File appended.")?
        }
        Command::Touch(name) => reply(out, fs.create_file(name), "File created.")?,
        Command::Remove(name) => reply(out, fs.delete_file(name), "File deleted.")?,
        Command::List => match fs.list_files() {
            Ok(names) if names.is_empty() => writeln!(out, "No files.")?,
            Ok(names) => {
                for name in names {
                    writeln!(out, "{name}")?;
                }
            }
            Err(e) => error(out, &e)?,
        },
        Command::Read(name) => match fs.read_file(name) {
            Ok(data) => writeln!(out, "{}", String::from_utf8_lossy(&data))?,
            Err(e) => error(out, &e)?,
        },
        Command::Stat(name) => match fs.file_info(name) {
            Ok(info) => writeln!(out, "{info}")?,
            Err(e) => error(out, &e)?,
        },
        Command::Info => match fs.info() {
            Ok(info) => writeln!(out, "{info}")?,
            Err(e) => error(out, &e)?,
        },
        Command::DeletePartition => reply(out, fs.format(), "Partition deleted.")?,
        Command::Wipe => reply(
            out,
            fs.clean_format(),
            "Partition wiped. Run `delpart` before using it.",
        )?,
        Command::StorageUse => match fs.storage_usage_percent() {
            Ok(pct) => writeln!(out, "Storage Usage: {pct:.2}%")?,
            Err(e) => error(out, &e)?,
        },
        Command::StorageUseBytes => match fs.bytes_used() {
            Ok(bytes) => writeln!(out, "Bytes Used: {bytes}")?,
            Err(e) => error(out, &e)?,
        },
        Command::Help => writeln!(out, "{HELP}")?,
        Command::Exit => return Ok(Flow::Exit),
    }
    Ok(Flow::Continue)
}

/// Parse and run one input line; blank lines do nothing.
pub fn run_line(fs: &mut MjolnFs, line: &str, out: &mut impl Write) -> io::Result<Flow> {
    if line.trim().is_empty() {
        return Ok(Flow::Continue);
    }
    match line.parse::<Command>() {
        Ok(cmd) => execute(fs, &cmd, out),
        Err(e) => {
            writeln!(out, "{e}")?;
            Ok(Flow::Continue)
        }
    }
}

fn reply(out: &mut impl Write, result: Result<()>, ok: &str) -> io::Result<()> {
    match result {
        Ok(()) => writeln!(out, "{ok}"),
        Err(e) => error(out, &e),
    }
}

fn error(out: &mut impl Write, e: &FsError) -> io::Result<()> {
    writeln!(out, "ERR: {e}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn shell() -> MjolnFs {
        let mut fs = MjolnFs::new(
            Arc::new(RamDisk::new(2048, 32)),
            FsConfig::default().with_slot_capacity(16),
        )
        .with_yield_hook(|_, _| {});
        fs.format().unwrap();
        fs
    }

    fn run(fs: &mut MjolnFs, line: &str) -> String {
        let mut out = Vec::new();
        run_line(fs, line, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            "mk a.txt hello world".parse(),
            Ok(Command::Make {
                name: "a.txt".into(),
                data: "hello world".into()
            })
        );
        assert_eq!("rm  a.txt ".parse(), Ok(Command::Remove("a.txt".into())));
        assert_eq!("ls".parse(), Ok(Command::List));
        assert_eq!(
            "mk a.txt".parse::<Command>(),
            Err(ParseError::Usage("mk <filename> <data>"))
        );
        assert_eq!("read".parse::<Command>(), Err(ParseError::Usage("read <filename>")));
        assert_eq!("format".parse::<Command>(), Err(ParseError::Unknown));
        assert_eq!("ls -l".parse::<Command>(), Err(ParseError::Unknown));
    }

    #[test]
    fn session() {
        let mut fs = shell();
        assert_eq!(run(&mut fs, "mk a.txt hello"), "File created.\n");
        assert_eq!(
            run(&mut fs, "mk a.txt again"),
            "ERR: file `a.txt` already exists\n"
        );
        assert_eq!(run(&mut fs, "read a.txt"), "hello\n");
        assert_eq!(run(&mut fs, "update a.txt hi"), "File updated.\n");
        assert_eq!(run(&mut fs, "append a.txt !"), "File appended.\n");
        assert_eq!(run(&mut fs, "read a.txt"), "hi!\n");
        assert_eq!(run(&mut fs, "storeusebytes"), "Bytes Used: 3\n");
        assert_eq!(run(&mut fs, "ls"), "a.txt\n");
        assert_eq!(run(&mut fs, "rm a.txt"), "File deleted.\n");
        assert_eq!(run(&mut fs, "read a.txt"), "ERR: file `a.txt` not found\n");
        assert_eq!(run(&mut fs, "ls"), "No files.\n");
        assert_eq!(run(&mut fs, "bogus"), "Unknown command.\n");
        assert_eq!(run(&mut fs, ""), "");
    }

    #[test]
    fn wipe_then_delpart() {
        let mut fs = shell();
        run(&mut fs, "mk a x");
        run(&mut fs, "wipe");
        assert_eq!(run(&mut fs, "ls"), "ERR: file system is not mounted\n");
        assert_eq!(run(&mut fs, "delpart"), "Partition deleted.\n");
        assert_eq!(run(&mut fs, "storeuse"), "Storage Usage: 0.00%\n");
    }

    #[test]
    fn exit_stops_the_loop() {
        let mut fs = shell();
        let mut out = Vec::new();
        assert_eq!(run_line(&mut fs, "exit", &mut out).unwrap(), Flow::Exit);
    }
}
