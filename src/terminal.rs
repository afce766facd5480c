//! Terminal-mode I/O.
//!
//! [`TerminalLink`] is the plain-data side: an input FIFO fed by the
//! stdin reader thread and an output sink the ACIA writes to. The
//! [`Terminal`] owns the tty state: it switches stdin to raw mode,
//! spawns the reader thread and installs signal handlers that write the
//! signal number into a self-pipe. The scheduler drains that pipe
//! between instructions and turns the bytes into interrupt posts, so no
//! emulator object is ever touched from handler context.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::signals::Notify;

#[derive(Default)]
struct LinkInner {
    input: VecDeque<u8>,
    output: Vec<u8>,
    /// Mirror output bytes straight to stdout (live terminal mode).
    echo_stdout: bool,
}

/// Shared queues between the terminal, the ACIA and the stdin reader.
#[derive(Clone, Default)]
pub struct TerminalLink {
    inner: Arc<Mutex<LinkInner>>,
}

impl TerminalLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_input(&self, byte: u8) {
        self.inner.lock().unwrap().input.push_back(byte);
    }

    pub fn has_input(&self) -> bool {
        !self.inner.lock().unwrap().input.is_empty()
    }

    pub fn read_input(&self) -> Option<u8> {
        self.inner.lock().unwrap().input.pop_front()
    }

    pub fn write_output(&self, byte: u8) {
        let mut inner = self.inner.lock().unwrap();
        if inner.echo_stdout {
            let mut out = std::io::stdout();
            let _ = out.write_all(&[byte]);
            let _ = out.flush();
        } else {
            inner.output.push(byte);
        }
    }

    /// Drain collected output (buffered mode only).
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.inner.lock().unwrap().output)
    }

    pub fn set_echo_stdout(&self, on: bool) {
        self.inner.lock().unwrap().echo_stdout = on;
    }
}

#[cfg(unix)]
mod tty {
    use std::sync::atomic::{AtomicI32, Ordering};

    /// Write end of the self-pipe, reachable from handler context.
    /// A file descriptor is the only state the handlers share.
    static PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

    extern "C" fn on_signal(signum: libc::c_int) {
        let fd = PIPE_WRITE_FD.load(Ordering::Relaxed);
        if fd >= 0 {
            let byte = signum as u8;
            unsafe {
                libc::write(fd, std::ptr::addr_of!(byte).cast(), 1);
            }
        }
    }

    pub struct RawTty {
        saved: libc::termios,
        pipe_read: i32,
        pipe_write: i32,
    }

    impl RawTty {
        pub fn open() -> std::io::Result<Self> {
            unsafe {
                let mut fds = [0i32; 2];
                if libc::pipe(fds.as_mut_ptr()) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                let flags = libc::fcntl(fds[0], libc::F_GETFL);
                libc::fcntl(fds[0], libc::F_SETFL, flags | libc::O_NONBLOCK);
                PIPE_WRITE_FD.store(fds[1], Ordering::Relaxed);

                let mut saved: libc::termios = std::mem::zeroed();
                if libc::tcgetattr(libc::STDIN_FILENO, &mut saved) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                let mut raw = saved;
                raw.c_lflag &= !(libc::ICANON | libc::ECHO);
                raw.c_cc[libc::VMIN] = 1;
                raw.c_cc[libc::VTIME] = 0;
                libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw);

                for sig in [libc::SIGINT, libc::SIGUSR1, libc::SIGUSR2] {
                    let mut action: libc::sigaction = std::mem::zeroed();
                    action.sa_sigaction = on_signal as usize;
                    libc::sigemptyset(&mut action.sa_mask);
                    libc::sigaction(sig, &action, std::ptr::null_mut());
                }

                Ok(Self { saved, pipe_read: fds[0], pipe_write: fds[1] })
            }
        }

        /// Non-blocking read of all pending signal bytes.
        pub fn drain(&self) -> Vec<u8> {
            let mut bytes = Vec::new();
            let mut buf = [0u8; 16];
            loop {
                let n = unsafe {
                    libc::read(self.pipe_read, buf.as_mut_ptr().cast(), buf.len())
                };
                if n <= 0 {
                    break;
                }
                bytes.extend_from_slice(&buf[..n as usize]);
            }
            bytes
        }
    }

    impl Drop for RawTty {
        fn drop(&mut self) {
            unsafe {
                libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &self.saved);
                PIPE_WRITE_FD.store(-1, Ordering::Relaxed);
                libc::close(self.pipe_read);
                libc::close(self.pipe_write);
            }
        }
    }

    pub fn signal_to_notify(byte: u8) -> Option<super::Notify> {
        match i32::from(byte) {
            x if x == libc::SIGINT => Some(super::Notify::SetNmi),
            x if x == libc::SIGUSR1 => Some(super::Notify::SetIrq),
            x if x == libc::SIGUSR2 => Some(super::Notify::SetFirq),
            _ => None,
        }
    }
}

pub struct Terminal {
    link: TerminalLink,
    #[cfg(unix)]
    tty: Option<tty::RawTty>,
}

impl Terminal {
    /// Plain terminal without tty takeover (GUI mode, tests).
    pub fn detached(link: TerminalLink) -> Self {
        Self {
            link,
            #[cfg(unix)]
            tty: None,
        }
    }

    /// Take over the controlling terminal: raw mode, reader thread,
    /// signal handlers.
    pub fn attach(link: TerminalLink) -> std::io::Result<Self> {
        link.set_echo_stdout(true);

        #[cfg(unix)]
        {
            let tty = tty::RawTty::open()?;
            spawn_stdin_reader(link.clone());
            Ok(Self { link, tty: Some(tty) })
        }

        #[cfg(not(unix))]
        {
            spawn_stdin_reader(link.clone());
            Ok(Self { link })
        }
    }

    pub fn link(&self) -> TerminalLink {
        self.link.clone()
    }

    /// Translate pending self-pipe bytes to interrupt notifications.
    pub fn drain_signals(&self) -> Vec<Notify> {
        #[cfg(unix)]
        {
            match &self.tty {
                Some(tty) => tty.drain().into_iter().filter_map(tty::signal_to_notify).collect(),
                None => Vec::new(),
            }
        }

        #[cfg(not(unix))]
        Vec::new()
    }
}

/// Third thread of the emulator: blocking stdin reads feeding the link.
fn spawn_stdin_reader(link: TerminalLink) {
    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            use std::io::Read;
            let mut stdin = std::io::stdin();
            let mut byte = [0u8; 1];
            while let Ok(1) = stdin.read(&mut byte) {
                link.push_input(byte[0]);
            }
        })
        .expect("spawn stdin reader");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_queues_input_in_order() {
        let link = TerminalLink::new();
        link.push_input(1);
        link.push_input(2);
        assert!(link.has_input());
        assert_eq!(link.read_input(), Some(1));
        assert_eq!(link.read_input(), Some(2));
        assert_eq!(link.read_input(), None);
    }

    #[test]
    fn buffered_output_is_collectable() {
        let link = TerminalLink::new();
        link.write_output(b'h');
        link.write_output(b'i');
        assert_eq!(link.take_output(), b"hi");
        assert!(link.take_output().is_empty());
    }

    #[test]
    fn detached_terminal_has_no_signals() {
        let term = Terminal::detached(TerminalLink::new());
        assert!(term.drain_signals().is_empty());
    }
}
