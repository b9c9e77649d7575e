//! Message chunking for size-capped delivery channels.
//!
//! Splits on line boundaries first, then on spaces, and only as a last resort
//! cuts inside a word. Lengths are counted in characters, not bytes.

/// Split `message` into chunks of at most `max_len` characters.
///
/// A message that already fits is returned unchanged as a single chunk, so an
/// empty message yields `[""]`. Chunks are closed with trailing whitespace
/// trimmed. A single word longer than `max_len` is cut to exactly `max_len`
/// characters and the rest of that word is dropped.
pub fn split_message(message: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if char_len(message) <= max_len {
        return vec![message.to_string()];
    }

    let mut chunker = Chunker::new(max_len);
    for line in message.split('\n') {
        chunker.push_line(line);
    }
    chunker.finish()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

struct Chunker {
    max_len: usize,
    chunks: Vec<String>,
    current: String,
    current_len: usize,
}

impl Chunker {
    fn new(max_len: usize) -> Self {
        Self {
            max_len,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
        }
    }

    /// Whether `piece` can join the current chunk behind one separator char.
    fn fits(&self, piece_len: usize) -> bool {
        if self.current.is_empty() {
            piece_len <= self.max_len
        } else {
            self.current_len + 1 + piece_len <= self.max_len
        }
    }

    fn append(&mut self, sep: char, piece: &str, piece_len: usize) {
        if !self.current.is_empty() {
            self.current.push(sep);
            self.current_len += 1;
        }
        self.current.push_str(piece);
        self.current_len += piece_len;
    }

    fn close(&mut self) {
        let trimmed = self.current.trim_end();
        if !trimmed.is_empty() {
            self.chunks.push(trimmed.to_string());
        }
        self.current.clear();
        self.current_len = 0;
    }

    fn push_line(&mut self, line: &str) {
        let len = char_len(line);
        if self.fits(len) {
            self.append('\n', line, len);
            return;
        }
        self.close();
        if len <= self.max_len {
            self.append('\n', line, len);
        } else {
            for word in line.split(' ') {
                self.push_word(word);
            }
        }
    }

    fn push_word(&mut self, word: &str) {
        let len = char_len(word);
        if self.fits(len) {
            self.append(' ', word, len);
            return;
        }
        self.close();
        if len <= self.max_len {
            self.append(' ', word, len);
        } else {
            // Lossy: the tail of an overlong word is discarded.
            self.chunks.push(word.chars().take(self.max_len).collect());
        }
    }

    /// Never empty: an all-whitespace message still yields one (blank) chunk.
    fn finish(mut self) -> Vec<String> {
        self.close();
        if self.chunks.is_empty() {
            self.chunks.push(String::new());
        }
        self.chunks
    }
}
