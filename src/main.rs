use clap::{value_parser, Arg, ArgAction, Command};
use env_logger::Env;
use mjoln::terminal::{self, Flow};
use mjoln::{DeviceModel, FsConfig, FsError, ImageFile, MjolnFs};

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    let logger = env_logger::Builder::from_env(Env::default().default_filter_or("warn")).build();

    let matches = Command::new("mjoln")
        .about("Shell for a Mjoln EEPROM image")
        .arg(
            Arg::new("image")
                .long("image")
                .value_name("FILE")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Device image, created erased if missing"),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .default_value("at24c256")
                .value_parser(DeviceModel::NAMES)
                .help("EEPROM model the image emulates"),
        )
        .arg(
            Arg::new("slots")
                .long("slots")
                .value_parser(value_parser!(u16))
                .help("Metadata slots written by `delpart` [default: per model]"),
        )
        .arg(
            Arg::new("threshold")
                .long("threshold")
                .value_parser(value_parser!(u16))
                .help("File count at which the lookup index load-balances"),
        )
        .arg(
            Arg::new("block-limit")
                .long("block-limit")
                .value_parser(value_parser!(u32))
                .help("Largest block a file is stored in before chaining"),
        )
        .arg(
            Arg::new("command")
                .short('c')
                .long("command")
                .action(ArgAction::Append)
                .help("Run a command and exit, may be repeated"),
        )
        .get_matches();

    // clap restricted these to the known names
    let model: DeviceModel = match matches.get_one::<String>("model").map(|m| m.parse()) {
        Some(Ok(model)) => model,
        _ => DeviceModel::At24c256,
    };
    let mut config = FsConfig::for_model(model);
    if let Some(&slots) = matches.get_one::<u16>("slots") {
        config = config.with_slot_capacity(slots);
    }
    if let Some(&threshold) = matches.get_one::<u16>("threshold") {
        config = config.with_cache_threshold(threshold);
    }
    if let Some(&limit) = matches.get_one::<u32>("block-limit") {
        config = config.with_block_limit(limit);
    }

    let Some(path) = matches.get_one::<PathBuf>("image") else {
        return ExitCode::FAILURE;
    };
    let image = match ImageFile::open_or_create(path, model) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("cannot open {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let mut fs = MjolnFs::new(Arc::new(image), config)
        .with_logger(Arc::new(logger))
        .with_yield_hook(progress_bar());

    match fs.mount() {
        Ok(_) => {}
        Err(e @ (FsError::NotFormatted | FsError::LegacyLayout(_))) => {
            eprintln!("{e}. Run `delpart` to format the device.");
        }
        Err(e) => {
            eprintln!("mount failed: {e}");
            return ExitCode::FAILURE;
        }
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = match matches.get_many::<String>("command") {
        Some(commands) => run_batch(&mut fs, commands, &mut out),
        None => run_shell(&mut fs, &mut out),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_batch<'a>(
    fs: &mut MjolnFs,
    commands: impl Iterator<Item = &'a String>,
    out: &mut impl Write,
) -> io::Result<()> {
    for line in commands {
        if terminal::run_line(fs, line, out)? == Flow::Exit {
            break;
        }
    }
    Ok(())
}

fn run_shell(fs: &mut MjolnFs, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Mjoln shell, `help` lists commands.")?;
    let stdin = io::stdin();
    loop {
        write!(out, "> ")?;
        out.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        if terminal::run_line(fs, &line, out)? == Flow::Exit {
            return Ok(());
        }
    }
}

/// Forty-column bar on stderr while the device is erased.
fn progress_bar() -> impl FnMut(u32, u32) + Send + 'static {
    const WIDTH: u64 = 40;
    let mut shown = 0u64;
    move |done, total| {
        let due = u64::from(done) * WIDTH / u64::from(total.max(1));
        let mut err = io::stderr();
        while shown < due {
            let _ = write!(err, "=");
            shown += 1;
        }
        if done >= total {
            let _ = writeln!(err);
            shown = 0;
        }
    }
}
