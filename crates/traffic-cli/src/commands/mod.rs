//! CLI commands

mod capture;
mod codes;
mod live;
mod stats;
mod status;
mod tail;

pub use capture::{capture, CaptureArgs};
pub use codes::{codes, CodesArgs};
pub use live::{live, LiveArgs};
pub use stats::{stats, StatsArgs};
pub use status::status;
pub use tail::{tail, TailArgs};

use console::{style, StyledObject};
use traffic_core::format::FormattedLine;
use traffic_core::Bound;

/// Color a rendered line by direction.
pub(crate) fn styled(line: &FormattedLine) -> StyledObject<&str> {
    let text = style(line.text.as_str());
    match line.bound {
        Bound::Inbound => text.green(),
        Bound::Outbound => text.cyan(),
        Bound::Unknown => text.dim(),
    }
}

pub(crate) fn on_off(enabled: bool) -> StyledObject<&'static str> {
    if enabled {
        style("on").green().bold()
    } else {
        style("off").red()
    }
}
