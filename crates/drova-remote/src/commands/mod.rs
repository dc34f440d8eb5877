//! Windows command-line builders
//!
//! Every builder renders through `Display`, so callers pass
//! `&builder.to_string()` to [`RemoteShell::run`](drova_core::traits::RemoteShell::run).

mod process;
mod registry;
mod shadow_defender;

pub use process::{GpUpdate, PsExec, Reboot, TaskKill};
pub use registry::{RegAdd, RegQueryEsme, RegValue, RegValueType};
pub use shadow_defender::{ShadowAction, ShadowDefenderCli};

use std::borrow::Cow;

/// Quote one argument for the MSVC runtime's command-line parser.
///
/// Arguments without whitespace or quotes pass through untouched.
/// Backslashes are only doubled where they precede a quote.
pub fn quote(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '"') {
        return Cow::Borrowed(arg);
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.extend(std::iter::repeat('\\').take(backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    quoted.extend(std::iter::repeat('\\').take(backslashes * 2));
    quoted.push('"');
    Cow::Owned(quoted)
}
