//! Redirectable header cursor.
//!
//! Some attribute tables may live either inline in the header or in an
//! external data block produced by `AdditionalStreamsInfo`. [`HeaderCursor`]
//! keeps a stack of active windows; [`StreamSwitch`] pushes one and pops it
//! on drop, so the previous window is restored on every exit path including
//! `?` propagation.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::Result;

use super::reader::ByteWindow;

/// Maximum number of simultaneously active windows, the root included.
pub const MAX_ACTIVE_WINDOWS: usize = 32;

#[derive(Debug, Clone)]
struct Window {
    data: Arc<[u8]>,
    start: usize,
    end: usize,
    pos: usize,
    advance_parent: bool,
}

impl Window {
    fn whole(data: Arc<[u8]>) -> Self {
        let end = data.len();
        Self {
            data,
            start: 0,
            end,
            pos: 0,
            advance_parent: false,
        }
    }

    fn remaining(&self) -> usize {
        (self.end - self.start).saturating_sub(self.pos)
    }
}

/// A header reader over a stack of byte windows.
///
/// Reads always come from the innermost window. The cursor also carries the
/// sticky "header error" flag raised by tolerated inconsistencies.
#[derive(Debug, Clone)]
pub struct HeaderCursor {
    root: Window,
    stack: Vec<Window>,
    header_error: bool,
}

impl HeaderCursor {
    /// Creates a cursor over a whole header blob.
    pub fn new(data: Arc<[u8]>) -> Self {
        Self {
            root: Window::whole(data),
            stack: Vec::new(),
            header_error: false,
        }
    }

    /// Returns the number of active windows, the root included.
    pub fn depth(&self) -> usize {
        self.stack.len() + 1
    }

    /// Returns true once any tolerated inconsistency was seen.
    pub fn header_error(&self) -> bool {
        self.header_error
    }

    /// Raises the sticky header-error flag.
    pub fn set_header_error(&mut self, what: &str) {
        if !self.header_error {
            log::warn!("7z header inconsistency: {what}");
        }
        self.header_error = true;
    }

    /// Fails unless the active window was read to its end.
    pub fn ensure_consumed(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(self.corrupt("unread bytes at the end of a property block"));
        }
        Ok(())
    }

    fn top(&self) -> &Window {
        self.stack.last().unwrap_or(&self.root)
    }

    fn top_mut(&mut self) -> &mut Window {
        self.stack.last_mut().unwrap_or(&mut self.root)
    }

    fn push(&mut self, window: Window) -> Result<()> {
        if self.depth() >= MAX_ACTIVE_WINDOWS {
            return Err(self.corrupt("too many nested data windows"));
        }
        self.stack.push(window);
        Ok(())
    }

    fn pop(&mut self) {
        let Some(window) = self.stack.pop() else {
            return;
        };
        if window.remaining() != 0 {
            self.set_header_error("data window released with unread bytes");
        }
        if window.advance_parent {
            self.top_mut().pos += window.pos;
        }
    }

    /// Reads the `external` flag and, if set, redirects reads to the indexed
    /// external data block until the returned guard is dropped.
    ///
    /// Fails with a header error when the flag is set but no external data
    /// is available or the index is out of range.
    pub fn switch_external(
        &mut self,
        external: Option<&[Arc<[u8]>]>,
    ) -> Result<StreamSwitch<'_>> {
        if self.read_u8()? == 0 {
            return Ok(StreamSwitch {
                cursor: self,
                pushed: false,
            });
        }
        let vectors =
            external.ok_or_else(|| self.corrupt("external data referenced without data blocks"))?;
        let index = self.read_num()? as usize;
        let data = vectors
            .get(index)
            .cloned()
            .ok_or_else(|| self.corrupt(format!("external data index {index} out of range")))?;
        self.push(Window::whole(data))?;
        Ok(StreamSwitch {
            cursor: self,
            pushed: true,
        })
    }

    /// Restricts reads to the next `size` bytes of the active window.
    ///
    /// On release the parent position advances past whatever the sub-window
    /// consumed.
    pub fn switch_sub_window(&mut self, size: u64) -> Result<StreamSwitch<'_>> {
        if size > self.remaining() as u64 {
            return Err(self.corrupt("property block larger than its container"));
        }
        let parent = self.top();
        let start = parent.start + parent.pos;
        let window = Window {
            data: Arc::clone(&parent.data),
            start,
            end: start + size as usize,
            pos: 0,
            advance_parent: true,
        };
        self.push(window)?;
        Ok(StreamSwitch {
            cursor: self,
            pushed: true,
        })
    }
}

impl ByteWindow for HeaderCursor {
    fn buffer(&self) -> &[u8] {
        let top = self.top();
        &top.data[top.start..top.end]
    }

    fn position(&self) -> usize {
        self.top().pos
    }

    fn set_position(&mut self, pos: usize) {
        self.top_mut().pos = pos;
    }
}

/// Scope guard for a pushed window; dereferences to the cursor.
#[derive(Debug)]
pub struct StreamSwitch<'c> {
    cursor: &'c mut HeaderCursor,
    pushed: bool,
}

impl StreamSwitch<'_> {
    /// Returns true when reads were redirected.
    pub fn is_redirected(&self) -> bool {
        self.pushed
    }
}

impl Deref for StreamSwitch<'_> {
    type Target = HeaderCursor;

    fn deref(&self) -> &HeaderCursor {
        self.cursor
    }
}

impl DerefMut for StreamSwitch<'_> {
    fn deref_mut(&mut self) -> &mut HeaderCursor {
        self.cursor
    }
}

impl Drop for StreamSwitch<'_> {
    fn drop(&mut self) {
        if self.pushed {
            self.cursor.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn cursor(bytes: &[u8]) -> HeaderCursor {
        HeaderCursor::new(Arc::from(bytes))
    }

    #[test]
    fn test_inline_switch_reads_in_place() {
        let mut cur = cursor(&[0x00, 0x2A]);
        {
            let mut sw = cur.switch_external(None).unwrap();
            assert!(!sw.is_redirected());
            assert_eq!(sw.read_u8().unwrap(), 0x2A);
        }
        assert_eq!(cur.remaining(), 0);
        assert!(!cur.header_error());
    }

    #[test]
    fn test_external_switch_redirects_and_restores() {
        let external: Vec<Arc<[u8]>> = vec![Arc::from(&[9u8][..]), Arc::from(&[7u8, 8][..])];
        let mut cur = cursor(&[0x01, 0x01, 0x55]);
        {
            let mut sw = cur.switch_external(Some(&external)).unwrap();
            assert_eq!(sw.depth(), 2);
            assert_eq!(sw.read_u8().unwrap(), 7);
            assert_eq!(sw.read_u8().unwrap(), 8);
        }
        assert_eq!(cur.depth(), 1);
        assert_eq!(cur.read_u8().unwrap(), 0x55);
        assert!(!cur.header_error());
    }

    #[test]
    fn test_external_switch_errors() {
        let mut cur = cursor(&[0x01, 0x00]);
        let err = cur.switch_external(None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incorrect);

        let external: Vec<Arc<[u8]>> = vec![Arc::from(&[1u8][..])];
        let mut cur = cursor(&[0x01, 0x03]);
        let err = cur.switch_external(Some(&external)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incorrect);
    }

    #[test]
    fn test_unread_bytes_raise_header_error() {
        let external: Vec<Arc<[u8]>> = vec![Arc::from(&[1u8, 2, 3][..])];
        let mut cur = cursor(&[0x01, 0x00]);
        {
            let mut sw = cur.switch_external(Some(&external)).unwrap();
            sw.read_u8().unwrap();
        }
        assert!(cur.header_error());
    }

    #[test]
    fn test_sub_window_advances_parent() {
        let mut cur = cursor(&[1, 2, 3, 4]);
        cur.read_u8().unwrap();
        {
            let mut sw = cur.switch_sub_window(2).unwrap();
            assert_eq!(sw.remaining(), 2);
            assert_eq!(sw.read_u8().unwrap(), 2);
            assert_eq!(sw.read_u8().unwrap(), 3);
            assert_eq!(sw.read_u8().unwrap_err().kind(), ErrorKind::EndOfData);
        }
        assert_eq!(cur.read_u8().unwrap(), 4);
    }

    #[test]
    fn test_sub_window_too_large() {
        let mut cur = cursor(&[1, 2]);
        assert_eq!(
            cur.switch_sub_window(3).unwrap_err().kind(),
            ErrorKind::Incorrect
        );
    }

    #[test]
    fn test_depth_limit() {
        fn nest(cur: &mut HeaderCursor, levels: usize) -> Result<()> {
            if levels == 0 {
                return Ok(());
            }
            let mut sw = cur.switch_sub_window(0)?;
            nest(&mut sw, levels - 1)
        }
        let mut cur = cursor(&[]);
        assert!(nest(&mut cur, MAX_ACTIVE_WINDOWS - 1).is_ok());
        let err = nest(&mut cur, MAX_ACTIVE_WINDOWS).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Incorrect);
        assert_eq!(cur.depth(), 1);
    }
}
