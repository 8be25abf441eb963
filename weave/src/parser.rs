//! Protocol stream parser (§4.1).
//!
//! Reassembles a chunked, possibly split token stream from an LLM into a sequence
//! of typed structural events. The wire protocol is five sigils: `§think:`,
//! `§respond:`, `§call:` open a named content section until the next delimiter;
//! `§execute` and `§end` terminate the stream. Text preceding any delimiter
//! belongs to an implicit `respond` section (the `OUTSIDE` state below).
//!
//! [`Parser`] is the synchronous core: `feed` consumes one token and returns the
//! events it resolves, buffering only the smallest ambiguous delimiter prefix
//! across calls. [`parse_tokens`] drives it over an async token source.

use std::collections::VecDeque;

use futures_util::stream::{self, Stream, StreamExt};
use thiserror::Error;

/// One token from an LLM token source. Providers that cannot guarantee a plain
/// string token (§4.1 "non-string token input") yield `Err`; the parser treats
/// this as fatal and stops.
pub type Token = Result<String, String>;

/// Errors the parser itself can raise. Never raised across a running task
/// boundary (§7) — only ever surfaced as the terminal item of the parser's
/// own event stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParserError {
    /// The upstream token source yielded a non-string token.
    #[error("parser expects string tokens: {0}")]
    NonStringToken(String),
    /// Reserved for a future strict mode; not raised by the default lenient
    /// flush-on-exhaustion behavior (§4.1 "unterminated stream").
    #[error("unexpected end of stream")]
    UnexpectedEnd,
}

/// A typed structural event emitted by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseEvent {
    Think(String),
    Respond(String),
    Call(String),
    Execute,
    End,
    Error(String),
}

impl ParseEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ParseEvent::Think(_) => "think",
            ParseEvent::Respond(_) => "respond",
            ParseEvent::Call(_) => "call",
            ParseEvent::Execute => "execute",
            ParseEvent::End => "end",
            ParseEvent::Error(_) => "error",
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            ParseEvent::Think(s) | ParseEvent::Respond(s) | ParseEvent::Call(s) | ParseEvent::Error(s) => {
                Some(s)
            }
            ParseEvent::Execute | ParseEvent::End => None,
        }
    }
}

/// The content section currently open. `Respond` is also the implicit
/// `OUTSIDE` state — text before any delimiter is attributed here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Think,
    Respond,
    Call,
}

const OPEN_KEYWORDS: &[(&str, Section)] = &[
    ("think", Section::Think),
    ("respond", Section::Respond),
    ("call", Section::Call),
];
const TERMINATOR_KEYWORDS: &[&str] = &["execute", "end"];

enum Classify {
    /// `consumed` bytes (including the leading `§`) resolve to `keyword`.
    /// `open` distinguishes a section-opening keyword from a terminator.
    Matched { consumed: usize, keyword: &'static str, open: bool },
    /// `consumed` bytes (at least the `§`) are definitively not a delimiter.
    FalseAlarm { consumed: usize },
    /// Not enough data yet to decide; caller should buffer and wait for more.
    Ambiguous,
}

/// Classifies `rest`, which must start with `§`.
fn classify(rest: &str) -> Classify {
    debug_assert!(rest.starts_with('§'));
    let tail = &rest[1..];
    let tail_lc = tail.to_lowercase();

    if tail.is_empty() {
        return Classify::Ambiguous;
    }

    for (kw, section) in OPEN_KEYWORDS {
        if let Some(result) = try_keyword(&tail_lc, kw, true) {
            return match result {
                KwMatch::Matched(consumed) => {
                    Classify::Matched { consumed: 1 + consumed, keyword: keyword_for(*section), open: true }
                }
                KwMatch::Ambiguous => Classify::Ambiguous,
                KwMatch::Mismatch => continue,
            };
        }
    }
    for kw in TERMINATOR_KEYWORDS {
        if let Some(result) = try_keyword(&tail_lc, kw, false) {
            return match result {
                KwMatch::Matched(consumed) => Classify::Matched { consumed: 1 + consumed, keyword: kw, open: false },
                KwMatch::Ambiguous => Classify::Ambiguous,
                KwMatch::Mismatch => continue,
            };
        }
    }

    // No keyword matched or prefix-matched `tail`: every keyword above is
    // shorter than the spec's 12-character false-alarm bound (§4.1), so a
    // mismatch here is always a genuine false alarm, never a truncated
    // buffer waiting on more input.
    Classify::FalseAlarm { consumed: 1 }
}

fn keyword_for(section: Section) -> &'static str {
    match section {
        Section::Think => "think",
        Section::Respond => "respond",
        Section::Call => "call",
    }
}

enum KwMatch {
    Matched(usize),
    Ambiguous,
    Mismatch,
}

/// Tries to match `kw` at the start of `tail_lc`. `requires_colon` governs
/// whether a trailing `:` is mandatory (open sections) or merely consumed
/// when present (terminators). Returns `None` if `tail_lc` doesn't even
/// share a prefix with `kw` — caller moves on to the next candidate.
fn try_keyword(tail_lc: &str, kw: &str, requires_colon: bool) -> Option<KwMatch> {
    let klen = kw.len();
    if tail_lc.len() < klen {
        if kw.starts_with(tail_lc) {
            return Some(KwMatch::Ambiguous);
        }
        return None;
    }
    if &tail_lc[..klen] != kw {
        return None;
    }
    if tail_lc.len() == klen {
        return Some(KwMatch::Ambiguous);
    }
    let next = tail_lc.as_bytes()[klen] as char;
    if requires_colon {
        if next == ':' {
            Some(KwMatch::Matched(klen + 1))
        } else {
            Some(KwMatch::Mismatch)
        }
    } else if next == ':' {
        Some(KwMatch::Matched(klen + 1))
    } else if next.is_ascii_alphanumeric() || next == '_' {
        Some(KwMatch::Mismatch)
    } else {
        Some(KwMatch::Matched(klen))
    }
}

/// The synchronous parser core. Feed it tokens one at a time; call [`Parser::finish`]
/// once the underlying token source is exhausted to flush any open section.
pub struct Parser {
    current: Section,
    call_buffer: String,
    carry: String,
    terminated: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            current: Section::Respond,
            call_buffer: String::new(),
            carry: String::new(),
            terminated: false,
        }
    }

    /// True once `§execute` or `§end` has been resolved; no further tokens
    /// should be fed (§4.1 "on §end ... stop consuming", "on §execute ... stop").
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Feeds one token, returning the events it resolves. Bounded buffering:
    /// only an ambiguous delimiter tail is held across calls.
    pub fn feed(&mut self, token: &str) -> Vec<ParseEvent> {
        if self.terminated {
            return Vec::new();
        }
        let buf = if self.carry.is_empty() {
            token.to_string()
        } else {
            let mut combined = std::mem::take(&mut self.carry);
            combined.push_str(token);
            combined
        };
        self.process(&buf)
    }

    /// Flushes any buffered content once the token source is exhausted with
    /// no terminator seen (§4.1 "unterminated stream").
    pub fn finish(&mut self) -> Vec<ParseEvent> {
        if self.terminated {
            return Vec::new();
        }
        let mut events = Vec::new();
        if !self.carry.is_empty() {
            let carry = std::mem::take(&mut self.carry);
            self.route(carry, &mut events);
        }
        self.finalize_call_if_open(&mut events);
        events
    }

    fn process(&mut self, buf: &str) -> Vec<ParseEvent> {
        let mut events = Vec::new();
        let mut local = String::new();
        let mut s = buf;

        loop {
            match s.find('§') {
                None => {
                    local.push_str(s);
                    self.flush_local(local, &mut events);
                    return events;
                }
                Some(idx) => {
                    local.push_str(&s[..idx]);
                    let rest = &s[idx..];
                    match classify(rest) {
                        Classify::Matched { consumed, keyword, open } => {
                            self.flush_local(std::mem::take(&mut local), &mut events);
                            if open {
                                self.finalize_call_if_open(&mut events);
                                let section = match keyword {
                                    "think" => Section::Think,
                                    "respond" => Section::Respond,
                                    "call" => Section::Call,
                                    _ => unreachable!(),
                                };
                                self.current = section;
                                let mut tail = &rest[consumed..];
                                if let Some(stripped) = tail.strip_prefix(' ') {
                                    tail = stripped;
                                }
                                s = tail;
                                continue;
                            } else {
                                self.finalize_call_if_open(&mut events);
                                events.push(match keyword {
                                    "execute" => ParseEvent::Execute,
                                    "end" => ParseEvent::End,
                                    _ => unreachable!(),
                                });
                                self.terminated = true;
                                return events;
                            }
                        }
                        Classify::FalseAlarm { consumed } => {
                            local.push_str(&rest[..consumed]);
                            s = &rest[consumed..];
                            continue;
                        }
                        Classify::Ambiguous => {
                            self.flush_local(std::mem::take(&mut local), &mut events);
                            self.carry = rest.to_string();
                            return events;
                        }
                    }
                }
            }
        }
    }

    fn flush_local(&mut self, content: String, events: &mut Vec<ParseEvent>) {
        if content.is_empty() {
            return;
        }
        self.route(content, events);
    }

    fn route(&mut self, content: String, events: &mut Vec<ParseEvent>) {
        match self.current {
            Section::Call => self.call_buffer.push_str(&content),
            Section::Think => events.push(ParseEvent::Think(content)),
            Section::Respond => events.push(ParseEvent::Respond(content)),
        }
    }

    fn finalize_call_if_open(&mut self, events: &mut Vec<ParseEvent>) {
        if self.current != Section::Call || self.call_buffer.is_empty() {
            if self.current == Section::Call {
                self.call_buffer.clear();
            }
            return;
        }
        let raw = std::mem::take(&mut self.call_buffer).trim().to_string();
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Array(_)) => events.push(ParseEvent::Call(raw)),
            Ok(_) => events.push(ParseEvent::Error(format!(
                "Invalid JSON in call section: expected an array, got {raw}"
            ))),
            Err(e) => events.push(ParseEvent::Error(format!("Invalid JSON in call section: {e}"))),
        }
    }
}

/// Drives [`Parser`] over an async token source, yielding events lazily.
/// A non-string token (`Err`) or a parser error ends the stream with that
/// error as the final item.
pub fn parse_tokens<S>(tokens: S) -> impl Stream<Item = Result<ParseEvent, ParserError>> + Send
where
    S: Stream<Item = Token> + Send + 'static,
{
    struct State<S> {
        parser: Parser,
        src: std::pin::Pin<Box<S>>,
        pending: VecDeque<ParseEvent>,
        done: bool,
    }

    let state = State { parser: Parser::new(), src: Box::pin(tokens), pending: VecDeque::new(), done: false };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(ev) = st.pending.pop_front() {
                return Some((Ok(ev), st));
            }
            if st.done {
                return None;
            }
            match st.src.next().await {
                Some(Ok(token)) => {
                    let events = st.parser.feed(&token);
                    if st.parser.is_terminated() {
                        st.done = true;
                    }
                    st.pending.extend(events);
                }
                Some(Err(bad)) => {
                    st.done = true;
                    return Some((Err(ParserError::NonStringToken(bad)), st));
                }
                None => {
                    let events = st.parser.finish();
                    st.done = true;
                    st.pending.extend(events);
                }
            }
        }
    })
}
