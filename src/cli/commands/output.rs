//! Output command - replay the output captured during a computation

use crate::cache::{STDERR, STDOUT};
use crate::cli::args::OutputArgs;
use crate::error::{CacheError, CacheResult};
use crate::store::StoreUnit;
use console::style;
use std::io::{self, Write};

/// Execute the output command
pub fn execute(args: OutputArgs) -> CacheResult<()> {
    let unit = StoreUnit::open(&args.file)?;
    let name = if args.stderr { STDERR } else { STDOUT };

    match unit.load(name)?.decode::<Option<String>>()? {
        Some(text) => {
            // Written verbatim; captured output carries its own newlines.
            let mut out = io::stdout().lock();
            out.write_all(text.as_bytes())
                .map_err(|e| CacheError::io("writing captured output", e))?;
            out.flush()
                .map_err(|e| CacheError::io("writing captured output", e))?;
        }
        None => eprintln!("{} No {} was captured for this cache", style("!").yellow(), name),
    }
    Ok(())
}
