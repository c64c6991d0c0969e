//! Platform seam: raw-mode ownership, single-flush writes, input waits.
//!
//! The engine core never touches the OS directly; it drives this trait.
//! [`TermPlatform`] is the crossterm-backed default for real terminals. A
//! process-wide registry of restore hooks runs on panic so an abnormal
//! termination never leaves the user's terminal in raw mode.

use crate::error::Result;
use std::collections::VecDeque;
use std::io::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, Once, OnceLock};
use std::time::Duration;

/// Terminal modes requested at raw-mode entry.
#[derive(Debug, Clone, Copy)]
pub struct PlatformOptions {
    /// Switch to the alternate screen buffer.
    pub alternate_screen: bool,
    /// Enable mouse capture.
    pub mouse: bool,
    /// Enable bracketed paste.
    pub bracketed_paste: bool,
    /// Enable focus change reporting.
    pub focus: bool,
}

impl Default for PlatformOptions {
    fn default() -> Self {
        Self {
            alternate_screen: true,
            mouse: false,
            bracketed_paste: true,
            focus: false,
        }
    }
}

/// Result of one input read.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOutcome {
    /// Bytes placed into the caller's buffer.
    pub bytes: usize,
    /// A resize observed during the read, if any.
    pub resized: Option<(i32, i32)>,
}

/// The contract the engine drives. One write call per present, one wait per
/// poll; nothing else blocks.
pub trait Platform {
    /// Enter raw mode with the requested modes; returns (cols, rows).
    fn enter_raw(&mut self, opts: &PlatformOptions) -> Result<(i32, i32)>;

    /// Leave raw mode and restore the terminal.
    fn leave_raw(&mut self) -> Result<()>;

    /// Write the whole buffer in a single flush.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Block until input is readable or the timeout elapses. True when
    /// readable.
    fn wait_input(&mut self, timeout_ms: u64) -> Result<bool>;

    /// Non-blocking read of available input bytes.
    fn read_input(&mut self, buf: &mut [u8]) -> Result<ReadOutcome>;

    /// Current terminal size.
    fn size(&mut self) -> Result<(i32, i32)>;
}

// ---------------------------------------------------------------------------
// Restore registry

type RestoreFn = Box<dyn Fn() + Send>;

static RESTORE_HOOKS: OnceLock<Mutex<Vec<(u64, RestoreFn)>>> = OnceLock::new();
static NEXT_HOOK_ID: AtomicU64 = AtomicU64::new(1);
static PANIC_HOOK_INSTALL: Once = Once::new();
static RESTORE_RUNNING: AtomicBool = AtomicBool::new(false);

fn hooks() -> &'static Mutex<Vec<(u64, RestoreFn)>> {
    RESTORE_HOOKS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Register a terminal-restore hook; returns an id for unregistering.
pub fn register_restore(f: RestoreFn) -> u64 {
    PANIC_HOOK_INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            run_restore_hooks();
            previous(info);
        }));
    });
    let id = NEXT_HOOK_ID.fetch_add(1, Ordering::Relaxed);
    if let Ok(mut list) = hooks().lock() {
        list.push((id, f));
    }
    id
}

/// Remove a previously registered hook.
pub fn unregister_restore(id: u64) {
    if let Ok(mut list) = hooks().lock() {
        list.retain(|(hook_id, _)| *hook_id != id);
    }
}

/// Run every registered hook once, guarded against reentry.
pub fn run_restore_hooks() {
    if RESTORE_RUNNING.swap(true, Ordering::AcqRel) {
        return;
    }
    if let Ok(list) = hooks().lock() {
        for (_, f) in list.iter() {
            f();
        }
    }
    RESTORE_RUNNING.store(false, Ordering::Release);
}

// ---------------------------------------------------------------------------
// Crossterm-backed default platform

/// The default platform: crossterm raw mode over stdin/stdout.
///
/// Crossterm owns event decoding on the input side, so reads re-encode its
/// events into canonical VT bytes for the engine's parser; the parser stays
/// the single source of truth for normalization.
#[derive(Debug, Default)]
pub struct TermPlatform {
    opts: PlatformOptions,
    raw: bool,
    restore_id: Option<u64>,
    carry: VecDeque<u8>,
}

impl TermPlatform {
    /// New, not yet in raw mode.
    pub fn new() -> Self {
        Self::default()
    }

    fn encode_event(&mut self, event: crossterm::event::Event) -> Option<(i32, i32)> {
        use crossterm::event::{Event, KeyCode as CtKey, KeyEventKind, KeyModifiers};
        match event {
            Event::Resize(w, h) => return Some((i32::from(w), i32::from(h))),
            Event::FocusGained => self.carry.extend(b"\x1b[I"),
            Event::FocusLost => self.carry.extend(b"\x1b[O"),
            Event::Paste(text) => {
                self.carry.extend(b"\x1b[200~");
                self.carry.extend(text.as_bytes());
                self.carry.extend(b"\x1b[201~");
            }
            Event::Mouse(m) => self.encode_mouse(&m),
            Event::Key(k) => {
                if k.kind != KeyEventKind::Press && k.kind != KeyEventKind::Repeat {
                    return None;
                }
                let ctrl = k.modifiers.contains(KeyModifiers::CONTROL);
                let alt = k.modifiers.contains(KeyModifiers::ALT);
                if alt {
                    self.carry.push_back(0x1b);
                }
                match k.code {
                    CtKey::Char(c) if ctrl && c.is_ascii_alphabetic() => {
                        self.carry.push_back(c.to_ascii_lowercase() as u8 - b'a' + 1);
                    }
                    CtKey::Char(c) => {
                        let mut buf = [0u8; 4];
                        self.carry.extend(c.encode_utf8(&mut buf).as_bytes());
                    }
                    CtKey::Enter => self.carry.push_back(b'\r'),
                    CtKey::Tab => self.carry.push_back(b'\t'),
                    CtKey::BackTab => self.carry.extend(b"\x1b[Z"),
                    CtKey::Backspace => self.carry.push_back(0x7f),
                    CtKey::Esc => self.carry.push_back(0x1b),
                    CtKey::Up => self.encode_arrow(b'A', k.modifiers),
                    CtKey::Down => self.encode_arrow(b'B', k.modifiers),
                    CtKey::Right => self.encode_arrow(b'C', k.modifiers),
                    CtKey::Left => self.encode_arrow(b'D', k.modifiers),
                    CtKey::Home => self.carry.extend(b"\x1b[H"),
                    CtKey::End => self.carry.extend(b"\x1b[F"),
                    CtKey::PageUp => self.carry.extend(b"\x1b[5~"),
                    CtKey::PageDown => self.carry.extend(b"\x1b[6~"),
                    CtKey::Insert => self.carry.extend(b"\x1b[2~"),
                    CtKey::Delete => self.carry.extend(b"\x1b[3~"),
                    CtKey::F(n @ 1..=4) => {
                        self.carry.extend(&[0x1b, b'O', b'P' + n - 1]);
                    }
                    CtKey::F(n @ 5..=12) => {
                        let num = match n {
                            5 => 15,
                            6..=10 => 11 + u32::from(n),
                            11 => 23,
                            _ => 24,
                        };
                        self.carry.extend(format!("\x1b[{num}~").as_bytes());
                    }
                    _ => {}
                }
            }
        }
        None
    }

    fn encode_arrow(&mut self, final_byte: u8, mods: crossterm::event::KeyModifiers) {
        use crossterm::event::KeyModifiers;
        let mut bits = 0u32;
        if mods.contains(KeyModifiers::SHIFT) {
            bits |= 1;
        }
        if mods.contains(KeyModifiers::ALT) {
            bits |= 2;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            bits |= 4;
        }
        if bits == 0 {
            self.carry.extend(&[0x1b, b'[', final_byte]);
        } else {
            self.carry
                .extend(format!("\x1b[1;{}{}", bits + 1, final_byte as char).as_bytes());
        }
    }

    fn encode_mouse(&mut self, m: &crossterm::event::MouseEvent) {
        use crossterm::event::{MouseButton, MouseEventKind};
        let (b, press) = match m.kind {
            MouseEventKind::Down(btn) => (button_bits(btn), true),
            MouseEventKind::Up(btn) => (button_bits(btn), false),
            MouseEventKind::Drag(btn) => (button_bits(btn) | 32, true),
            MouseEventKind::Moved => (3 | 32, true),
            MouseEventKind::ScrollUp => (64, true),
            MouseEventKind::ScrollDown => (65, true),
            _ => return,
        };
        fn button_bits(btn: MouseButton) -> u32 {
            match btn {
                MouseButton::Left => 0,
                MouseButton::Middle => 1,
                MouseButton::Right => 2,
            }
        }
        let suffix = if press { 'M' } else { 'm' };
        self.carry.extend(
            format!("\x1b[<{};{};{}{}", b, m.column + 1, m.row + 1, suffix).as_bytes(),
        );
    }
}

impl Platform for TermPlatform {
    fn enter_raw(&mut self, opts: &PlatformOptions) -> Result<(i32, i32)> {
        use crossterm::{event, execute, terminal};
        self.opts = *opts;
        terminal::enable_raw_mode()?;
        let mut stdout = std::io::stdout();
        if opts.alternate_screen {
            execute!(stdout, terminal::EnterAlternateScreen)?;
        }
        if opts.mouse {
            execute!(stdout, event::EnableMouseCapture)?;
        }
        if opts.bracketed_paste {
            execute!(stdout, event::EnableBracketedPaste)?;
        }
        if opts.focus {
            execute!(stdout, event::EnableFocusChange)?;
        }
        self.raw = true;
        let restore_opts = *opts;
        self.restore_id = Some(register_restore(Box::new(move || {
            restore_terminal(&restore_opts);
        })));
        let (w, h) = terminal::size()?;
        Ok((i32::from(w), i32::from(h)))
    }

    fn leave_raw(&mut self) -> Result<()> {
        if !self.raw {
            return Ok(());
        }
        self.raw = false;
        if let Some(id) = self.restore_id.take() {
            unregister_restore(id);
        }
        restore_terminal(&self.opts);
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(bytes)?;
        stdout.flush()?;
        Ok(())
    }

    fn wait_input(&mut self, timeout_ms: u64) -> Result<bool> {
        if !self.carry.is_empty() {
            return Ok(true);
        }
        Ok(crossterm::event::poll(Duration::from_millis(timeout_ms))?)
    }

    fn read_input(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        let mut outcome = ReadOutcome::default();
        // Drain pending crossterm events into the carry buffer.
        while self.carry.len() < buf.len() && crossterm::event::poll(Duration::ZERO)? {
            if let Some(size) = self.encode_event(crossterm::event::read()?) {
                outcome.resized = Some(size);
                break;
            }
        }
        while outcome.bytes < buf.len() {
            match self.carry.pop_front() {
                Some(b) => {
                    buf[outcome.bytes] = b;
                    outcome.bytes += 1;
                }
                None => break,
            }
        }
        Ok(outcome)
    }

    fn size(&mut self) -> Result<(i32, i32)> {
        let (w, h) = crossterm::terminal::size()?;
        Ok((i32::from(w), i32::from(h)))
    }
}

impl Drop for TermPlatform {
    fn drop(&mut self) {
        let _ = self.leave_raw();
    }
}

fn restore_terminal(opts: &PlatformOptions) {
    use crossterm::{event, execute, terminal};
    let mut stdout = std::io::stdout();
    if opts.focus {
        let _ = execute!(stdout, event::DisableFocusChange);
    }
    if opts.bracketed_paste {
        let _ = execute!(stdout, event::DisableBracketedPaste);
    }
    if opts.mouse {
        let _ = execute!(stdout, event::DisableMouseCapture);
    }
    if opts.alternate_screen {
        let _ = execute!(stdout, terminal::LeaveAlternateScreen);
    }
    let _ = terminal::disable_raw_mode();
}

// ---------------------------------------------------------------------------
// In-memory platform for tests

/// Scripted platform: input fed from a queue, writes captured.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MockPlatform {
    pub size: (i32, i32),
    pub input: VecDeque<Vec<u8>>,
    pub writes: Vec<Vec<u8>>,
    pub fail_writes: bool,
    pub raw: bool,
    pub resize_to: Option<(i32, i32)>,
}

#[cfg(test)]
impl MockPlatform {
    pub fn new(cols: i32, rows: i32) -> Self {
        Self {
            size: (cols, rows),
            ..Self::default()
        }
    }
}

#[cfg(test)]
impl Platform for MockPlatform {
    fn enter_raw(&mut self, _opts: &PlatformOptions) -> Result<(i32, i32)> {
        self.raw = true;
        Ok(self.size)
    }

    fn leave_raw(&mut self) -> Result<()> {
        self.raw = false;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(crate::error::Error::Io(std::io::Error::other(
                "scripted write failure",
            )));
        }
        self.writes.push(bytes.to_vec());
        Ok(())
    }

    fn wait_input(&mut self, _timeout_ms: u64) -> Result<bool> {
        Ok(!self.input.is_empty() || self.resize_to.is_some())
    }

    fn read_input(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        let mut outcome = ReadOutcome::default();
        if let Some(size) = self.resize_to.take() {
            self.size = size;
            outcome.resized = Some(size);
        }
        if let Some(chunk) = self.input.pop_front() {
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            outcome.bytes = n;
        }
        Ok(outcome)
    }

    fn size(&mut self) -> Result<(i32, i32)> {
        Ok(self.size)
    }
}
