pub mod args;

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::task::{Context, Poll, Waker};

use args::Args;
use clap::Parser;
use tracing::{info, warn};

use crate::encode::Encoder;
use crate::error::{EncodeError, Result};
use crate::options::EncodeOptions;
use crate::value::Value;

/// Runs the CLI entrypoint.
///
/// # Errors
/// Returns an error if reading the input, parsing it as JSON, or
/// re-encoding or writing the output fails.
pub fn run() -> Result<()> {
    let args = Args::parse();
    let input = read_input(&args)?;

    let parsed: serde_json::Value =
        serde_json::from_str(&input).map_err(|err| EncodeError::message(err.to_string()))?;
    let value = Value::from(parsed);

    let options = EncodeOptions {
        indent: Some(args.resolved_indent()),
        replacer: None,
        high_water_mark: args.chunk_size,
    };

    let mut encoder = Encoder::new(value, Some(options));
    let mut output = open_output(&args)?;

    let waker = Waker::noop();
    let mut cx = Context::from_waker(waker);
    let (mut chunk_count, mut byte_count) = (0usize, 0usize);

    loop {
        match encoder.poll_pull(&mut cx, args.chunk_size.unwrap_or(0)) {
            Poll::Ready(Some(Ok(chunk))) => {
                chunk_count += 1;
                byte_count += chunk.len();
                output.write_all(&chunk)?;
            }
            Poll::Ready(Some(Err(err))) => {
                warn!(error = %err, "encode failed");
                return Err(err);
            }
            Poll::Ready(None) => break,
            Poll::Pending => continue,
        }
    }
    output.write_all(b"\n")?;
    output.flush()?;

    if let Some(ref path) = args.output {
        info!(path = %path.display(), chunks = chunk_count, bytes = byte_count, "wrote output");
    }
    if args.stats {
        eprintln!("chunks: {chunk_count}, bytes: {byte_count}");
    }

    Ok(())
}

fn read_input(args: &Args) -> Result<String> {
    if args.is_stdin() {
        read_stdin()
    } else {
        let path = args
            .input
            .as_ref()
            .ok_or_else(|| EncodeError::message("no input file specified"))?;
        read_file(path)
    }
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .map_err(EncodeError::stdin_read)?;
    Ok(buffer)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| EncodeError::file_read(path.to_path_buf(), err))
}

/// An output sink that writes `EncodeError::Io` on failure, matching the
/// teacher's `ToonError::file_write`/`stdout_write` idiom even though
/// `std::io::Write` itself speaks `std::io::Error`.
enum Output {
    File(File, std::path::PathBuf),
    Stdout,
}

impl Output {
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Self::File(file, path) => file
                .write_all(buf)
                .map_err(|err| EncodeError::file_write(path.clone(), err)),
            Self::Stdout => io::stdout().write_all(buf).map_err(EncodeError::stdout_write),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            Self::File(file, _) => file.flush().map_err(EncodeError::stdout_write),
            Self::Stdout => io::stdout().flush().map_err(EncodeError::stdout_write),
        }
    }
}

fn open_output(args: &Args) -> Result<Output> {
    match &args.output {
        Some(path) => {
            let file =
                File::create(path).map_err(|err| EncodeError::file_write(path.clone(), err))?;
            Ok(Output::File(file, path.clone()))
        }
        None => Ok(Output::Stdout),
    }
}
