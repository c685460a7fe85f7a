//! Line sanitizer and tokenizer
//!
//! Tokens are whitespace-separated. Only the first token is classified, against a fixed
//! keyword set; a line whose first token is not a keyword is a generic expression statement.

/// Comment marker. Everything after it (outside a string literal) is discarded.
pub const COMMENT_SYMBOL: char = ';';

/* ===================== Keywords ===================== */

/// Classification of a line's first token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    ScriptName,
    Variable,
    Begin,
    End,
    While,
    Loop,
    ForEach,
    If,
    ElseIf,
    Else,
    EndIf,
    Return,
    Break,
    Continue,
}

impl Keyword {
    pub fn parse(word: &str) -> Option<Keyword> {
        let keyword = match word.to_ascii_lowercase().as_str() {
            "scriptname" => Keyword::ScriptName,
            "variable" => Keyword::Variable,
            "begin" => Keyword::Begin,
            "end" => Keyword::End,
            "while" => Keyword::While,
            "loop" => Keyword::Loop,
            "foreach" => Keyword::ForEach,
            "if" => Keyword::If,
            "elseif" => Keyword::ElseIf,
            "else" => Keyword::Else,
            "endif" => Keyword::EndIf,
            "return" => Keyword::Return,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::ScriptName => "scriptname",
            Keyword::Variable => "variable",
            Keyword::Begin => "begin",
            Keyword::End => "end",
            Keyword::While => "while",
            Keyword::Loop => "loop",
            Keyword::ForEach => "foreach",
            Keyword::If => "if",
            Keyword::ElseIf => "elseif",
            Keyword::Else => "else",
            Keyword::EndIf => "endif",
            Keyword::Return => "return",
            Keyword::Break => "break",
            Keyword::Continue => "continue",
        }
    }
}

/* ===================== Sanitizer ===================== */

/// Which clean-up passes [`sanitize`] applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeOps {
    pub strip_comments: bool,
    pub strip_leading_whitespace: bool,
    pub strip_tabs: bool,
}

impl SanitizeOps {
    pub const COMMENTS: SanitizeOps = SanitizeOps {
        strip_comments: true,
        strip_leading_whitespace: false,
        strip_tabs: false,
    };

    pub const LEADING_WHITESPACE: SanitizeOps = SanitizeOps {
        strip_comments: false,
        strip_leading_whitespace: true,
        strip_tabs: false,
    };

    pub const ALL: SanitizeOps = SanitizeOps {
        strip_comments: true,
        strip_leading_whitespace: true,
        strip_tabs: true,
    };
}

/// Cleans a raw source line. Trailing whitespace is always removed.
pub fn sanitize(line: &str, ops: SanitizeOps) -> String {
    let mut out = if ops.strip_comments {
        strip_comment(line).to_string()
    } else {
        line.to_string()
    };

    if ops.strip_tabs {
        out = out.replace('\t', " ");
    }
    if ops.strip_leading_whitespace {
        out = out.trim_start().to_string();
    }

    out.trim_end().to_string()
}

fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            COMMENT_SYMBOL if !in_string => return &line[..i],
            _ => {}
        }
    }
    line
}

/* ===================== Tokenizer ===================== */

/// Whitespace-separated tokens of one logical line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenizedLine {
    pub tokens: Vec<String>,
    /// Byte offset of each token in the tokenized text.
    pub indices: Vec<usize>,
}

impl TokenizedLine {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    /// Keyword of the first token.
    ///
    /// A keyword directly followed by `(` (e.g. `return(1)`) still counts as that keyword.
    pub fn keyword(&self) -> Option<Keyword> {
        let first = self.tokens.first()?;
        let word_end = first
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(first.len());
        let (word, rest) = first.split_at(word_end);

        if rest.is_empty() || rest.starts_with('(') {
            Keyword::parse(word)
        } else {
            None
        }
    }
}

/// Splits `line` on whitespace.
pub fn tokenize(line: &str) -> TokenizedLine {
    let mut tokenized = TokenizedLine::default();
    let mut start = None;

    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                tokenized.tokens.push(line[s..i].to_string());
                tokenized.indices.push(s);
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        tokenized.tokens.push(line[s..].to_string());
        tokenized.indices.push(s);
    }

    tokenized
}

/// Text following the first token of `line`, trimmed. Used for conditions and arguments.
pub fn remainder_after_keyword<'a>(line: &'a str, keyword: Keyword) -> &'a str {
    let trimmed = line.trim_start();
    let len = keyword.as_str().len().min(trimmed.len());
    trimmed[len..].trim()
}
