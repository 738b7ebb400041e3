use crate::ui::theme::{theme, Role, Stream};
use owo_colors::OwoColorize;

const CHECK: &str = "✅";
const CROSS: &str = "❌";
const WARN: &str = "⚠️";
const DATABASE: &str = "🗄️";

fn paint(stream: Stream, role: Role, text: &str) -> String {
    text.style(theme(stream).style(role)).to_string()
}

pub fn header(text: &str) {
    println!("{} {}", DATABASE, paint(Stream::Stdout, Role::Title, text));
}

pub fn success(label: &str) {
    println!("{} {}", CHECK, paint(Stream::Stdout, Role::Done, label));
}

pub fn error(label: &str) {
    eprintln!("{} {}", CROSS, paint(Stream::Stderr, Role::Failure, label));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", WARN, paint(Stream::Stderr, Role::Notice, label));
}

/// `key: value` detail line under a header
pub fn info(key: &str, value: &str) {
    println!("  {}: {}", paint(Stream::Stdout, Role::Key, key), value);
}
