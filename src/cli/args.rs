use clap::Parser;
use std::path::PathBuf;

/// Streaming JSON re-encoder — reads JSON and writes it back out through
/// the pull-driven streaming encoder.
#[derive(Parser, Debug)]
#[command(name = "fluxjson", version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    fluxjson input.json                 # Re-encode to stdout, compact
    fluxjson input.json --pretty         # Pretty-print with default indent
    fluxjson input.json -o output.json  # Write to a file
    cat data.json | fluxjson            # Read from stdin
    fluxjson input.json --stats         # Print byte/chunk counts to stderr")]
pub struct Args {
    /// Input file path (omit or use "-" to read from stdin)
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,

    /// Output file path (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Pretty-print with indentation (default indent width if no `--indent`)
    #[arg(long)]
    pub pretty: bool,

    /// Indentation width in spaces, 0-10 (implies `--pretty`)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub indent: Option<u8>,

    /// Requested pull size in bytes, i.e. the consumer-side high-water
    /// mark spec'd for the encoder's backpressure contract
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Print chunk-count and byte-count statistics to stderr
    #[arg(long)]
    pub stats: bool,
}

impl Args {
    /// Returns true if reading from stdin.
    #[must_use]
    pub fn is_stdin(&self) -> bool {
        self.input.is_none() || self.input.as_ref().is_some_and(|p| p.as_os_str() == "-")
    }

    /// Resolve this invocation's indentation setting (spec 4.3).
    #[must_use]
    pub fn resolved_indent(&self) -> crate::options::Indent {
        match self.indent {
            Some(width) => crate::options::Indent::spaces(width),
            None if self.pretty => crate::options::Indent::spaces(2),
            None => crate::options::Indent::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn pretty_without_indent_defaults_to_two_spaces() {
        let args = Args {
            input: None,
            output: None,
            pretty: true,
            indent: None,
            chunk_size: None,
            stats: false,
        };
        assert_eq!(args.resolved_indent(), crate::options::Indent::spaces(2));
    }

    #[test]
    fn neither_flag_is_compact() {
        let args = Args {
            input: None,
            output: None,
            pretty: false,
            indent: None,
            chunk_size: None,
            stats: false,
        };
        assert_eq!(args.resolved_indent(), crate::options::Indent::None);
    }

    #[test]
    fn explicit_indent_implies_pretty() {
        let args = Args {
            input: None,
            output: None,
            pretty: false,
            indent: Some(4),
            chunk_size: None,
            stats: false,
        };
        assert_eq!(args.resolved_indent(), crate::options::Indent::spaces(4));
    }
}
