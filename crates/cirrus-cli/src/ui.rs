//! UI utilities for the Cirrus CLI.

use std::io::Write;

const BOX_WIDTH: usize = 41;

/// A formatted box restating the device-login code and page.
pub struct LoginBox<'a> {
    user_code: &'a str,
    verification_uri: &'a str,
}

impl<'a> LoginBox<'a> {
    /// Create a new login box.
    #[must_use]
    pub const fn new(user_code: &'a str, verification_uri: &'a str) -> Self {
        Self {
            user_code,
            verification_uri,
        }
    }

    /// Display the login box to stdout.
    pub fn display(&self) {
        let code_line = format!("Code:  {}", self.user_code);

        println!("  ┌{}┐", "─".repeat(BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));
        println!("  │{}│", center_in_box(self.verification_uri, BOX_WIDTH));
        println!("  │{}│", center_in_box(&code_line, BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));
        println!("  └{}┘", "─".repeat(BOX_WIDTH));
    }
}

fn center_in_box(content: &str, width: usize) -> String {
    let content_len = content.chars().count();
    let padding = width.saturating_sub(content_len);
    let left = padding / 2;
    let right = padding - left;
    format!("{}{}{}", " ".repeat(left), content, " ".repeat(right))
}

/// Format a byte count for humans.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{size:.1} {}", UNITS[unit])
}

/// Redraw an in-place progress line on stdout.
pub fn draw_progress(transferred: u64, total: u64, percentage: f64) {
    print!(
        "\r  {} / {} ({percentage:.1}%)  ",
        format_size(transferred),
        format_size(total)
    );
    let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3_276_800), "3.1 MB");
    }
}
