use anyhow::bail;
use uqe_engine::QueryValidator;

use crate::cli::GlobalFlags;
use crate::cli::root_commands::ValidateArgs;
use crate::input::{parameters, read_json};
use crate::output::output;

/// Handle `uqe validate`.
pub fn handle(args: &ValidateArgs, flags: &GlobalFlags) -> anyhow::Result<()> {
    let document = read_json(&args.file)?;
    let bag = parameters(&args.input)?;
    let report = QueryValidator::new().validate(&document, &bag);

    output(&report, flags.format)?;
    if !report.valid {
        bail!(
            "{} failed validation with {} error(s)",
            args.file.display(),
            report.errors.len()
        );
    }
    Ok(())
}
