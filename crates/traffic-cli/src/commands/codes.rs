//! Reference tables

use crate::error::ExitStatus;
use anyhow::Result;
use clap::Subcommand;
use console::style;
use traffic_core::status;

#[derive(Subcommand, Debug)]
pub enum CodesArgs {
    /// HTTP status codes recognized by the classifier
    Http,
    /// Exit codes of this tool
    Exit,
}

pub fn codes(args: &CodesArgs) -> Result<()> {
    match args {
        CodesArgs::Http => {
            for (code, reason) in status::all() {
                let code_text = code.to_string();
                let code = match code / 100 {
                    2 => style(code_text).green(),
                    3 => style(code_text).cyan(),
                    4 => style(code_text).yellow(),
                    5 => style(code_text).red(),
                    _ => style(code_text).dim(),
                };
                println!("{} {}", code, reason);
            }
        }
        CodesArgs::Exit => {
            for exit in ExitStatus::ALL {
                println!("{} {}", style(exit.code()).bold(), exit.description());
            }
        }
    }
    Ok(())
}
