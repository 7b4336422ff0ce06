//! The strip: a stack of variable-slot frames.
//!
//! A frame is pushed on every function/class/loop/catch/body entry and
//! popped on exit. Slots hold shared record cells, so a cloned strip (a
//! closure capture) keeps aliasing the same storage — mutating a captured
//! variable is visible on both sides.

use crate::record::RecordRef;

#[derive(Debug, Clone, Default)]
pub struct Frame {
    entries: Vec<(String, RecordRef)>,
}

#[derive(Debug, Clone)]
pub struct Strip {
    frames: Vec<Frame>,
}

impl Strip {
    pub fn new() -> Strip {
        Strip {
            frames: vec![Frame::default()],
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Claim the next slot in the innermost frame. Shadowing is allowed;
    /// lookup finds the most recent claim.
    pub fn declare(&mut self, name: impl Into<String>, record: RecordRef) {
        self.frames
            .last_mut()
            .expect("strip always has a frame")
            .entries
            .push((name.into(), record));
    }

    /// Innermost binding for `name`, walking frames outward.
    pub fn lookup(&self, name: &str) -> Option<RecordRef> {
        for frame in self.frames.iter().rev() {
            for (n, r) in frame.entries.iter().rev() {
                if n == name {
                    return Some(r.clone());
                }
            }
        }
        None
    }

    /// Slots claimed in the innermost frame — the per-scope count the
    /// opcode builder mirrors with its `Ent` operands.
    pub fn top_slot_count(&self) -> usize {
        self.frames.last().map(|f| f.entries.len()).unwrap_or(0)
    }
}

impl Default for Strip {
    fn default() -> Strip {
        Strip::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;

    #[test]
    fn lookup_walks_frames_outward() {
        let mut strip = Strip::new();
        strip.declare("x", Record::make_int(1).into_ref());
        strip.push_frame();
        strip.declare("y", Record::make_int(2).into_ref());
        assert_eq!(strip.lookup("x").unwrap().lock().to_string(), "1");
        assert_eq!(strip.lookup("y").unwrap().lock().to_string(), "2");
        strip.pop_frame();
        assert!(strip.lookup("y").is_none());
    }

    #[test]
    fn shadowing_finds_innermost() {
        let mut strip = Strip::new();
        strip.declare("x", Record::make_int(1).into_ref());
        strip.push_frame();
        strip.declare("x", Record::make_int(2).into_ref());
        assert_eq!(strip.lookup("x").unwrap().lock().to_string(), "2");
        strip.pop_frame();
        assert_eq!(strip.lookup("x").unwrap().lock().to_string(), "1");
    }

    #[test]
    fn cloned_strip_aliases_cells() {
        let mut strip = Strip::new();
        let cell = Record::make_int(10).into_ref();
        strip.declare("shared", cell.clone());
        let captured = strip.clone();
        cell.lock().payload = crate::record::Payload::Int(99.into());
        assert_eq!(captured.lookup("shared").unwrap().lock().to_string(), "99");
    }

    #[test]
    fn top_slot_count_tracks_innermost_frame() {
        let mut strip = Strip::new();
        strip.declare("a", Record::make_int(1).into_ref());
        strip.push_frame();
        assert_eq!(strip.top_slot_count(), 0);
        strip.declare("b", Record::make_int(2).into_ref());
        strip.declare("c", Record::make_int(3).into_ref());
        assert_eq!(strip.top_slot_count(), 2);
    }
}
