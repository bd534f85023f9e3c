//! Get command - print one stored value

use crate::cli::args::GetArgs;
use crate::error::CacheResult;
use crate::store::StoreUnit;

/// Execute the get command
pub fn execute(args: GetArgs) -> CacheResult<()> {
    let unit = StoreUnit::open(&args.file)?;
    let json = unit.load(&args.name)?.to_json()?;

    if args.compact {
        println!("{}", serde_json::to_string(&json)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&json)?);
    }
    Ok(())
}
