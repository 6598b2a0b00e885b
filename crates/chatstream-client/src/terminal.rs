use std::io::Write;
use std::sync::Mutex;

use chatstream_core::Role;

use crate::session::{RoundState, SessionObserver};
use crate::transcript::Message;

/// Prints the in-flight assistant message to a writer as it grows.
pub struct TerminalObserver<W> {
    out: Mutex<Printer<W>>,
}

struct Printer<W> {
    writer: W,
    printed: usize,
}

impl<W: Write + Send> TerminalObserver<W> {
    pub fn new(writer: W) -> Self {
        Self {
            out: Mutex::new(Printer { writer, printed: 0 }),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(printer) => printer.writer,
            Err(poisoned) => poisoned.into_inner().writer,
        }
    }
}

impl<W: Write + Send> SessionObserver for TerminalObserver<W> {
    fn transcript_updated(&self, messages: &[Message]) {
        let Some(last) = messages.last().filter(|m| m.role() == Role::Assistant) else {
            return;
        };
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        let content = last.content();
        if let Some(new_text) = content.get(out.printed..).filter(|s| !s.is_empty()) {
            let _ = out.writer.write_all(new_text.as_bytes());
            let _ = out.writer.flush();
            out.printed = content.len();
        }
    }

    fn state_changed(&self, state: RoundState) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        match state {
            RoundState::Sending => out.printed = 0,
            RoundState::Completed | RoundState::Failed if out.printed > 0 => {
                let _ = out.writer.write_all(b"\n");
                let _ = out.writer.flush();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{MessageAttachments, TranscriptAccumulator};

    #[test]
    fn prints_only_new_assistant_text() {
        let observer = TerminalObserver::new(Vec::new());
        let mut transcript = TranscriptAccumulator::new();

        observer.state_changed(RoundState::Sending);
        transcript
            .push_user("hi", MessageAttachments::default())
            .expect("user");
        observer.transcript_updated(transcript.messages());
        transcript.begin_assistant().expect("assistant");
        observer.transcript_updated(transcript.messages());
        for delta in ["Hel", "lo"] {
            transcript.apply_delta(delta).expect("delta");
            observer.transcript_updated(transcript.messages());
        }
        observer.state_changed(RoundState::Completed);

        assert_eq!(observer.into_inner(), b"Hello\n");
    }

    #[test]
    fn empty_round_prints_nothing() {
        let observer = TerminalObserver::new(Vec::new());
        observer.state_changed(RoundState::Sending);
        observer.state_changed(RoundState::Failed);
        assert!(observer.into_inner().is_empty());
    }
}
