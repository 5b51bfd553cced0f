//! Terminal capability detection.
//!
//! Runs exactly once per process: environment hints first, then (only when
//! attached to an interactive terminal) a single DA1 query bounded by a
//! timeout. The result is immutable for the remainder of the session.
//!
//! Design invariants:
//! * Detection never fails. A silent or malformed probe reply degrades to
//!   environment-derived values; an empty environment degrades to the
//!   conservative set (no color, ASCII only).
//! * The probe is the only read from the terminal device outside the resize
//!   path, and it is bounded: the caller supplies a deadline and we never
//!   block past it.
//! * `NO_COLOR` wins over every other color hint, including the probe.

use std::io::{Read, Write};
use std::time::Duration;

/// Color support tiers, coarsest usable classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorDepth {
    Mono,
    Ansi16,
    Ansi256,
    TrueColor,
}

/// Coarse terminal-family classification used to gate sequence dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalFamily {
    Xterm,
    VteBased,
    AppleTerminal,
    WindowsConsole,
    Unknown,
}

/// Immutable feature record for the attached terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySet {
    pub color: ColorDepth,
    pub unicode: bool,
    pub mouse: bool,
    pub bracketed_paste: bool,
    pub family: TerminalFamily,
}

impl CapabilitySet {
    /// Safe fallback: no color, ASCII only, no optional input protocols.
    pub fn conservative() -> Self {
        Self {
            color: ColorDepth::Mono,
            unicode: false,
            mouse: false,
            bracketed_paste: false,
            family: TerminalFamily::Unknown,
        }
    }

    /// Derive capabilities from environment variables via the supplied
    /// lookup. Pure; the process environment variant is [`detect_capabilities`].
    pub fn from_env_vars<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let term = get("TERM").unwrap_or_default();
        let family = classify_family(
            &term,
            get("TERM_PROGRAM").as_deref(),
            get("WT_SESSION").is_some(),
        );

        let no_color = get("NO_COLOR").is_some_and(|v| !v.is_empty());
        let color = if no_color {
            ColorDepth::Mono
        } else {
            color_from_env(&term, get("COLORTERM").as_deref())
        };

        let unicode = ["LC_ALL", "LC_CTYPE", "LANG"]
            .iter()
            .find_map(|k| get(k).filter(|v| !v.is_empty()))
            .map(|v| {
                let v = v.to_ascii_lowercase();
                v.contains("utf-8") || v.contains("utf8")
            })
            .unwrap_or(false);

        // Optional input protocols are widespread across the modern families;
        // a dumb or unclassifiable terminal gets neither.
        let modern = family != TerminalFamily::Unknown && term != "dumb";

        Self {
            color,
            unicode,
            mouse: modern,
            bracketed_paste: modern,
            family,
        }
    }
}

fn classify_family(term: &str, term_program: Option<&str>, wt_session: bool) -> TerminalFamily {
    if wt_session {
        return TerminalFamily::WindowsConsole;
    }
    match term_program {
        Some("Apple_Terminal") => return TerminalFamily::AppleTerminal,
        Some("iTerm.app") => return TerminalFamily::Xterm,
        _ => {}
    }
    if term.starts_with("xterm") || term.starts_with("screen") || term.starts_with("tmux") {
        TerminalFamily::Xterm
    } else if term.contains("gnome") || term.contains("vte") || term.starts_with("foot") {
        TerminalFamily::VteBased
    } else {
        TerminalFamily::Unknown
    }
}

fn color_from_env(term: &str, colorterm: Option<&str>) -> ColorDepth {
    match colorterm {
        Some("truecolor") | Some("24bit") => return ColorDepth::TrueColor,
        _ => {}
    }
    if term.contains("256color") {
        ColorDepth::Ansi256
    } else if term.is_empty() || term == "dumb" {
        ColorDepth::Mono
    } else {
        ColorDepth::Ansi16
    }
}

/// One-shot interactive capability query. Implementations must respect the
/// timeout: `query` returns `None` when no complete reply arrived in time.
pub trait CapabilityProbe {
    fn query(&mut self, timeout: Duration) -> Option<Vec<u8>>;
}

/// Production probe: writes a DA1 request (`ESC [ c`) to the terminal and
/// waits for the reply on stdin via a reader thread, bounded by
/// `recv_timeout`. The reader thread is detached; if the terminal never
/// answers it parks on a read that can only fire once (one-time init cost).
pub struct StdinProbe;

impl CapabilityProbe for StdinProbe {
    fn query(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        let mut out = std::io::stdout();
        if out.write_all(b"\x1b[c").and_then(|()| out.flush()).is_err() {
            return None;
        }

        let (tx, rx) = crossbeam_channel::bounded::<Vec<u8>>(1);
        std::thread::spawn(move || {
            let mut buf = [0u8; 64];
            if let Ok(n) = std::io::stdin().read(&mut buf)
                && n > 0
            {
                let _ = tx.send(buf[..n].to_vec());
            }
        });

        match rx.recv_timeout(timeout) {
            Ok(bytes) => Some(bytes),
            Err(_) => {
                tracing::debug!(target: "term.caps", timeout_ms = timeout.as_millis() as u64, "probe_timeout");
                None
            }
        }
    }
}

/// Parse a DA1 reply (`ESC [ ? p1 ; p2 ; ... c`). Defensive: anything that
/// does not match the shape yields `None`, never an error.
pub fn parse_da1_reply(bytes: &[u8]) -> Option<Vec<u16>> {
    let text = std::str::from_utf8(bytes).ok()?;
    let start = text.find("\x1b[?")?;
    let rest = &text[start + 3..];
    let end = rest.find('c')?;
    let params = &rest[..end];
    if params.is_empty() {
        return Some(Vec::new());
    }
    params
        .split(';')
        .map(|p| p.parse::<u16>().ok())
        .collect::<Option<Vec<u16>>>()
}

/// Full detection pipeline: environment hints, then an optional bounded
/// probe refinement. DA1 parameter 22 advertises ANSI color; it upgrades a
/// `Mono` verdict that came from a missing/unknown `TERM`, but never
/// overrides an explicit `NO_COLOR`.
pub fn detect_capabilities<F>(
    get: F,
    probe: Option<&mut dyn CapabilityProbe>,
    timeout: Duration,
) -> CapabilitySet
where
    F: Fn(&str) -> Option<String>,
{
    let no_color = get("NO_COLOR").is_some_and(|v| !v.is_empty());
    let mut caps = CapabilitySet::from_env_vars(&get);

    if let Some(probe) = probe {
        match probe.query(timeout).as_deref().map(parse_da1_reply) {
            Some(Some(params)) => {
                tracing::debug!(target: "term.caps", params = ?params, "probe_reply");
                if !no_color && caps.color == ColorDepth::Mono && params.contains(&22) {
                    caps.color = ColorDepth::Ansi16;
                }
            }
            Some(None) => {
                tracing::debug!(target: "term.caps", "probe_reply_malformed");
            }
            None => {
                // Timeout or write failure: environment verdict stands.
            }
        }
    }

    tracing::debug!(
        target: "term.caps",
        color = ?caps.color,
        unicode = caps.unicode,
        family = ?caps.family,
        "capabilities_detected"
    );
    caps
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn truecolor_from_colorterm() {
        let caps = CapabilitySet::from_env_vars(env(&[
            ("TERM", "xterm-256color"),
            ("COLORTERM", "truecolor"),
        ]));
        assert_eq!(caps.color, ColorDepth::TrueColor);
        assert_eq!(caps.family, TerminalFamily::Xterm);
    }

    #[test]
    fn ansi256_from_term() {
        let caps = CapabilitySet::from_env_vars(env(&[("TERM", "xterm-256color")]));
        assert_eq!(caps.color, ColorDepth::Ansi256);
    }

    #[test]
    fn no_color_forces_mono() {
        let caps = CapabilitySet::from_env_vars(env(&[
            ("TERM", "xterm-256color"),
            ("COLORTERM", "truecolor"),
            ("NO_COLOR", "1"),
        ]));
        assert_eq!(caps.color, ColorDepth::Mono);
    }

    #[test]
    fn unicode_from_lang() {
        let caps = CapabilitySet::from_env_vars(env(&[("LANG", "en_US.UTF-8")]));
        assert!(caps.unicode);
        let caps = CapabilitySet::from_env_vars(env(&[("LANG", "C")]));
        assert!(!caps.unicode);
    }

    #[test]
    fn empty_environment_is_conservative() {
        let caps = CapabilitySet::from_env_vars(env(&[]));
        assert_eq!(caps.color, ColorDepth::Mono);
        assert!(!caps.unicode);
        assert!(!caps.mouse);
        assert!(!caps.bracketed_paste);
        assert_eq!(caps.family, TerminalFamily::Unknown);
    }

    #[test]
    fn parse_da1_valid_and_garbage() {
        assert_eq!(parse_da1_reply(b"\x1b[?62;22c"), Some(vec![62, 22]));
        assert_eq!(parse_da1_reply(b"\x1b[?1;2c"), Some(vec![1, 2]));
        assert_eq!(parse_da1_reply(b"random junk"), None);
        assert_eq!(parse_da1_reply(b"\x1b[?62;xxc"), None);
        assert_eq!(parse_da1_reply(b""), None);
    }

    struct SilentProbe;
    impl CapabilityProbe for SilentProbe {
        fn query(&mut self, _timeout: Duration) -> Option<Vec<u8>> {
            None
        }
    }

    struct ReplyProbe(Vec<u8>);
    impl CapabilityProbe for ReplyProbe {
        fn query(&mut self, _timeout: Duration) -> Option<Vec<u8>> {
            Some(self.0.clone())
        }
    }

    #[test]
    fn silent_probe_falls_back_to_env() {
        let mut probe = SilentProbe;
        let caps = detect_capabilities(
            env(&[("TERM", "dumb")]),
            Some(&mut probe),
            Duration::from_millis(10),
        );
        assert_eq!(caps.color, ColorDepth::Mono);
        assert!(!caps.mouse);
    }

    #[test]
    fn probe_upgrades_unknown_term_color() {
        let mut probe = ReplyProbe(b"\x1b[?62;22c".to_vec());
        let caps = detect_capabilities(env(&[]), Some(&mut probe), Duration::from_millis(10));
        assert_eq!(caps.color, ColorDepth::Ansi16);
    }

    #[test]
    fn probe_never_overrides_no_color() {
        let mut probe = ReplyProbe(b"\x1b[?62;22c".to_vec());
        let caps = detect_capabilities(
            env(&[("NO_COLOR", "1")]),
            Some(&mut probe),
            Duration::from_millis(10),
        );
        assert_eq!(caps.color, ColorDepth::Mono);
    }

    #[test]
    fn malformed_reply_is_ignored() {
        let mut probe = ReplyProbe(b"\x1b]garbage".to_vec());
        let caps = detect_capabilities(
            env(&[("TERM", "xterm")]),
            Some(&mut probe),
            Duration::from_millis(10),
        );
        assert_eq!(caps.color, ColorDepth::Ansi16);
    }
}
