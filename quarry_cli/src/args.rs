//! Command-line argument parser for the tree stress sample.
//!
//! Hand-rolled: two positional integers and a couple of flags do not
//! justify a dependency.

/// Usage text printed for `-h` / `--help` and on parse errors.
pub const USAGE: &str = "\
Usage: quarry [OPTIONS] [TREES] [MAX_HEIGHT]

Builds and validates TREES binary trees of every height below MAX_HEIGHT,
rebuilding them in place and letting the collector reclaim the previous
generation between heights. Prints elapsed seconds on completion.

Arguments:
  TREES        number of trees kept alive at once   [default: 100]
  MAX_HEIGHT   exclusive upper bound on tree height [default: 15]

Options:
  -v, --verbose   log each collection cycle to stdout
  -h, --help      print this help
";

/// Parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    /// Number of trees kept alive at once.
    pub trees: usize,
    /// Exclusive upper bound on tree height.
    pub max_height: usize,
    /// Log collection cycles to stdout.
    pub verbose: bool,
}

/// Outcome of parsing: run the sample or print help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// Run with these arguments.
    Run(Args),
    /// `-h` / `--help` was given.
    Help,
}

/// Parse the argument list (without the program name).
pub fn parse(argv: impl Iterator<Item = String>) -> Result<Parsed, String> {
    let mut args = Args {
        trees: 100,
        max_height: 15,
        verbose: false,
    };
    let mut positionals = 0;

    for arg in argv {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Parsed::Help),
            "-v" | "--verbose" => args.verbose = true,
            _ if arg.starts_with('-') => {
                return Err(format!("unknown option '{arg}'\n\n{USAGE}"));
            }
            _ => {
                let value: usize = arg
                    .parse()
                    .map_err(|_| format!("'{arg}' is not a number\n\n{USAGE}"))?;
                match positionals {
                    0 => args.trees = value,
                    1 => args.max_height = value,
                    _ => return Err(format!("too many arguments\n\n{USAGE}")),
                }
                positionals += 1;
            }
        }
    }

    if args.trees == 0 || args.max_height == 0 {
        return Err(format!("TREES and MAX_HEIGHT must be positive\n\n{USAGE}"));
    }
    Ok(Parsed::Run(args))
}
