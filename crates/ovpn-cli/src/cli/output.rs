//! # CLI Output Helpers
//!
//! Styled status lines and aligned report fields.

use console::{style, Emoji, Style};

use ovpn_stack::StackState;

static OK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
static FAIL: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
static WARN: Emoji<'_, '_> = Emoji("⚡ ", "[!] ");

fn status_line(icon: Emoji<'_, '_>, color: Style, msg: impl std::fmt::Display) -> String {
    format!(" {}{}", color.bold().apply_to(icon), msg)
}

pub fn print_success(msg: &str) {
    println!("{}", status_line(OK, Style::new().green(), msg));
}

/// Print an error message to stderr
pub fn print_error(msg: impl std::fmt::Display) {
    eprintln!("{}", status_line(FAIL, Style::new().red(), format!("Error: {}", msg)));
}

pub fn print_warning(msg: &str) {
    println!("{}", status_line(WARN, Style::new().yellow(), msg));
}

/// Section title
pub fn print_header(title: &str) {
    println!();
    println!(" {}", style(title).cyan().bold());
}

/// Aligned `key: value` row under a header
pub fn print_field(key: &str, value: impl std::fmt::Display) {
    println!("   {:<22} {}", style(key).dim(), value);
}

/// Stack state, green once established and red once invalidated
pub fn print_state(state: StackState) {
    let styled = match state {
        StackState::Established => style(state).green(),
        StackState::Invalidated => style(state).red().bold(),
        _ => style(state).yellow(),
    };
    print_field("state", styled);
}
