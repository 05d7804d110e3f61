//! Block index allocation for protocols that interleave text and tool calls
//! on one linear stream without block indices of their own
//!
//! The first block gets index 0 and every later block the next unused
//! index. Opening any block closes an open text or thinking block first.
//! Tool blocks stay open until closed explicitly or by [`BlockTracker::close_all`].

use crate::types::StreamEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    Tool,
}

/// Per-stream block bookkeeping
#[derive(Debug, Default)]
pub struct BlockTracker {
    next_index: u32,
    /// Open blocks in the order they were opened
    open: Vec<(u32, BlockKind)>,
}

impl BlockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a text fragment, opening a text block if none is open
    pub fn text(&mut self, text: String) -> Vec<StreamEvent> {
        let (index, mut events) = self.prose_block(BlockKind::Text);
        events.push(StreamEvent::TextDelta { index, text });
        events
    }

    /// Emit a reasoning fragment, opening a thinking block if none is open
    pub fn thinking(&mut self, thinking: String) -> Vec<StreamEvent> {
        let (index, mut events) = self.prose_block(BlockKind::Thinking);
        events.push(StreamEvent::ThinkingDelta { index, thinking });
        events
    }

    /// Open a tool block, returning its index and the events to emit
    pub fn open_tool(&mut self, id: String, name: String) -> (u32, Vec<StreamEvent>) {
        let mut events = self.close_prose();
        let index = self.allocate(BlockKind::Tool);
        events.push(StreamEvent::ToolCallStart { index, id, name });
        (index, events)
    }

    /// Close one block by index
    pub fn close(&mut self, index: u32) -> Option<StreamEvent> {
        let position = self.open.iter().position(|(open, _)| *open == index)?;
        let (index, kind) = self.open.remove(position);
        Some(end_event(index, kind))
    }

    /// Close the open text or thinking block, if any
    pub fn close_prose(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.open.retain(|(index, kind)| {
            if *kind == BlockKind::Tool {
                true
            } else {
                events.push(end_event(*index, *kind));
                false
            }
        });
        events
    }

    /// Close every open block in the order it was opened
    pub fn close_all(&mut self) -> Vec<StreamEvent> {
        self.open.drain(..).map(|(index, kind)| end_event(index, kind)).collect()
    }

    /// Whether a block with this index is open
    pub fn is_open(&self, index: u32) -> bool {
        self.open.iter().any(|(open, _)| *open == index)
    }

    /// Whether any block has ever been opened
    pub const fn has_blocks(&self) -> bool {
        self.next_index > 0
    }

    fn prose_block(&mut self, kind: BlockKind) -> (u32, Vec<StreamEvent>) {
        if let Some((index, _)) = self.open.iter().find(|(_, open)| *open == kind) {
            return (*index, Vec::new());
        }

        let events = self.close_prose();
        (self.allocate(kind), events)
    }

    fn allocate(&mut self, kind: BlockKind) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        self.open.push((index, kind));
        index
    }
}

const fn end_event(index: u32, kind: BlockKind) -> StreamEvent {
    match kind {
        BlockKind::Tool => StreamEvent::ToolCallEnd { index },
        BlockKind::Text | BlockKind::Thinking => StreamEvent::ContentBlockEnd { index },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_then_tool_closes_text_first() {
        let mut blocks = BlockTracker::new();
        let mut events = blocks.text("hi".into());
        let (index, opened) = blocks.open_tool("call_1".into(), "lookup".into());
        events.extend(opened);

        assert_eq!(index, 1);
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta {
                    index: 0,
                    text: "hi".into()
                },
                StreamEvent::ContentBlockEnd { index: 0 },
                StreamEvent::ToolCallStart {
                    index: 1,
                    id: "call_1".into(),
                    name: "lookup".into()
                },
            ]
        );
    }

    #[test]
    fn tools_only_start_at_zero_and_close_in_open_order() {
        let mut blocks = BlockTracker::new();
        let (a, _) = blocks.open_tool("a".into(), "f".into());
        let (b, _) = blocks.open_tool("b".into(), "g".into());
        assert_eq!((a, b), (0, 1));
        assert!(blocks.is_open(1));

        assert_eq!(
            blocks.close_all(),
            vec![StreamEvent::ToolCallEnd { index: 0 }, StreamEvent::ToolCallEnd { index: 1 }]
        );
        assert!(blocks.close_all().is_empty());
    }

    #[test]
    fn thinking_then_text_switches_blocks() {
        let mut blocks = BlockTracker::new();
        blocks.thinking("hmm".into());
        let events = blocks.text("answer".into());
        assert_eq!(
            events,
            vec![
                StreamEvent::ContentBlockEnd { index: 0 },
                StreamEvent::TextDelta {
                    index: 1,
                    text: "answer".into()
                },
            ]
        );
    }

    #[test]
    fn closing_unknown_index_is_a_no_op() {
        let mut blocks = BlockTracker::new();
        assert!(blocks.close(3).is_none());
        assert!(!blocks.has_blocks());
    }
}
