//! Sectioned output buffers.
//!
//! Declarations discovered late in the token stream still need to appear before the code that
//! uses them, so profiles write into named sections that are concatenated in a fixed order once
//! the whole stream has been decoded.

use std::fmt::{self, Write as _};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Preflight,
    Globals,
    Inputs,
    Outputs,
    Helpers,
    Subroutines,
    MainlineIntro,
    MainlineArguments,
    MainlineTop,
    Mainline,
    Postflight,
    /// Code for subroutines nothing calls. Never assembled.
    Ignore,
}

impl Section {
    pub const ASSEMBLY_ORDER: [Section; 11] = [
        Section::Preflight,
        Section::Globals,
        Section::Inputs,
        Section::Outputs,
        Section::Helpers,
        Section::Subroutines,
        Section::MainlineIntro,
        Section::MainlineArguments,
        Section::MainlineTop,
        Section::Mainline,
        Section::Postflight,
    ];

    const COUNT: usize = 12;

    fn slot(self) -> usize {
        self as usize
    }
}

const INDENT: &str = "    ";

#[derive(Debug)]
pub struct Output {
    buffers: [String; Section::COUNT],
    indents: [usize; Section::COUNT],
    current: Section,
    stack: Vec<Section>,
    /// Replaces the text sections entirely when set (binary profiles).
    binary: Option<Vec<u8>>,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            buffers: Default::default(),
            indents: [0; Section::COUNT],
            current: Section::Mainline,
            stack: Vec::new(),
            binary: None,
        }
    }
}

impl Output {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Section {
        self.current
    }

    /// Redirects writes to `section` until the matching [`Output::pop_section`].
    pub fn push_section(&mut self, section: Section) {
        self.stack.push(self.current);
        self.current = section;
    }

    pub fn pop_section(&mut self) {
        if let Some(previous) = self.stack.pop() {
            self.current = previous;
        }
    }

    pub fn indent(&mut self) {
        self.indents[self.current.slot()] += 1;
    }

    pub fn dedent(&mut self) {
        let level = &mut self.indents[self.current.slot()];
        *level = level.saturating_sub(1);
    }

    pub fn indent_level(&self) -> usize {
        self.indents[self.current.slot()]
    }

    pub fn set_indent_level(&mut self, level: usize) {
        self.indents[self.current.slot()] = level;
    }

    /// Appends one indented line to the current section.
    pub fn line(&mut self, args: fmt::Arguments<'_>) {
        let slot = self.current.slot();
        let buf = &mut self.buffers[slot];
        for _ in 0..self.indents[slot] {
            buf.push_str(INDENT);
        }
        let _ = writeln!(buf, "{args}");
    }

    /// Appends text verbatim to the current section.
    pub fn push_str(&mut self, text: &str) {
        self.buffers[self.current.slot()].push_str(text);
    }

    pub fn section(&self, section: Section) -> &str {
        &self.buffers[section.slot()]
    }

    pub fn set_binary(&mut self, bytes: Vec<u8>) {
        self.binary = Some(bytes);
    }

    /// Final output bytes: the binary payload if one was set, else the assembled text.
    pub fn into_bytes(self) -> Vec<u8> {
        match self.binary {
            Some(bytes) => bytes,
            None => self.assemble().into_bytes(),
        }
    }

    /// Concatenates every assembled section.
    pub fn assemble(&self) -> String {
        let len = Section::ASSEMBLY_ORDER
            .iter()
            .map(|s| self.buffers[s.slot()].len())
            .sum();
        let mut out = String::with_capacity(len);
        for section in Section::ASSEMBLY_ORDER {
            out.push_str(&self.buffers[section.slot()]);
        }
        out
    }
}

/// Writes a formatted line into the current output section.
macro_rules! out_line {
    ($out:expr, $($arg:tt)*) => {
        $out.line(format_args!($($arg)*))
    };
}
pub(crate) use out_line;
