// ✂️ Row Splitter - INSERT statements → raw row-tuples
// Reads dump text line by line and emits one RawRow per parenthesized tuple
//
// Supported input:
// - DROP TABLE / CREATE TABLE lines (ignored)
// - INSERT INTO <table> VALUES (...)[, (...)]*;  on one line or many
//
// A statement ends on the first line whose last character is `;`. A new
// INSERT header also closes any statement still open.
//
// Quoting: ' or " open a quoted run that ends on the same character. Quotes
// only matter inside a statement's tuples; they never keep a statement open.
// Escaped quotes are NOT unescaped (known limitation of the dump dialect).

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ============================================================================
// CORE TYPES
// ============================================================================

/// RawRow - Output of the splitter
/// Fields are still raw strings, in source order, with quote characters removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub table: String,
    pub fields: Vec<String>,
    pub line_number: usize, // Line where the INSERT statement started
}

/// Counters collected while splitting (never fatal)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitStats {
    pub lines: usize,
    pub ddl_lines: usize,
    pub statements: usize,
    pub skipped_statements: usize,
    pub unterminated_statements: usize,
}

#[derive(Debug)]
enum State {
    Idle,
    Collecting {
        table: String,
        start_line: usize,
        buffer: String,
    },
    Skipping,
}

// ============================================================================
// ROW SPLITTER
// ============================================================================

/// Line-driven state machine.
///
/// Only tables listed in `known_tables` are collected. INSERTs for any other
/// table are skipped up to their terminator.
pub struct RowSplitter<'a> {
    known_tables: &'a [&'a str],
    state: State,
    rows: Vec<RawRow>,
    stats: SplitStats,
}

impl<'a> RowSplitter<'a> {
    pub fn new(known_tables: &'a [&'a str]) -> Self {
        RowSplitter {
            known_tables,
            state: State::Idle,
            rows: Vec::new(),
            stats: SplitStats::default(),
        }
    }

    /// Feed one line of dump text (1-based line number)
    pub fn feed_line(&mut self, line_number: usize, line: &str) {
        self.stats.lines += 1;

        if !matches!(self.state, State::Idle) && parse_insert_header(line.trim_start()).is_some() {
            self.flush_open_statement("INSERT statement cut off by the next INSERT; using partial rows");
        }

        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => self.start_statement(line_number, line),

            State::Collecting {
                table,
                start_line,
                mut buffer,
            } => {
                buffer.push('\n');
                buffer.push_str(line);

                if ends_statement(line) {
                    self.emit(&table, start_line, &buffer);
                } else {
                    self.state = State::Collecting {
                        table,
                        start_line,
                        buffer,
                    };
                }
            }

            State::Skipping => {
                if !ends_statement(line) {
                    self.state = State::Skipping;
                }
            }
        }
    }

    fn start_statement(&mut self, line_number: usize, line: &str) {
        let trimmed = line.trim_start();

        if starts_with_ignore_case(trimmed, "DROP TABLE")
            || starts_with_ignore_case(trimmed, "CREATE TABLE")
        {
            self.stats.ddl_lines += 1;
            return;
        }

        let Some((table, rest)) = parse_insert_header(trimmed) else {
            return;
        };

        let complete = ends_statement(rest);

        if !self.known_tables.iter().any(|t| t.eq_ignore_ascii_case(&table)) {
            debug!(table = %table, line = line_number, "skipping INSERT for unknown table");
            self.stats.skipped_statements += 1;
            if !complete {
                self.state = State::Skipping;
            }
            return;
        }

        if complete {
            self.emit(&table, line_number, rest);
        } else {
            self.state = State::Collecting {
                table,
                start_line: line_number,
                buffer: rest.to_string(),
            };
        }
    }

    /// Close an open statement without its terminator: counted, split best-effort
    fn flush_open_statement(&mut self, reason: &str) {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Collecting {
                table,
                start_line,
                buffer,
            } => {
                warn!(table = %table, line = start_line, "{}", reason);
                self.stats.unterminated_statements += 1;
                self.emit(&table, start_line, &buffer);
            }
            State::Skipping => {
                self.stats.unterminated_statements += 1;
            }
            State::Idle => {}
        }
    }

    fn emit(&mut self, table: &str, start_line: usize, statement: &str) {
        self.stats.statements += 1;

        let values = values_section(statement);
        let tuples = split_tuples(values);
        debug!(
            table = %table,
            line = start_line,
            tuples = tuples.len(),
            "split INSERT statement"
        );

        let table = table.to_lowercase();
        for tuple in tuples {
            self.rows.push(RawRow {
                table: table.clone(),
                fields: split_fields(&tuple),
                line_number: start_line,
            });
        }
    }

    /// Flush any statement left open at end of input and return the rows.
    ///
    /// An unterminated statement is split best-effort; it never aborts the run.
    pub fn finish(mut self) -> (Vec<RawRow>, SplitStats) {
        self.flush_open_statement("INSERT statement not terminated before end of input; using partial rows");
        (self.rows, self.stats)
    }
}

/// Split a whole dump held in memory
pub fn split_dump(text: &str, known_tables: &[&str]) -> (Vec<RawRow>, SplitStats) {
    let mut splitter = RowSplitter::new(known_tables);
    for (idx, line) in text.lines().enumerate() {
        splitter.feed_line(idx + 1, line);
    }
    splitter.finish()
}

// ============================================================================
// TUPLE & FIELD SCANNING
// ============================================================================

/// Split the VALUES section into the contents of each top-level tuple.
///
/// Parentheses inside quotes do not count. Text between tuples is ignored.
/// A tuple still open at the end is returned as-is (best effort).
pub fn split_tuples(values: &str) -> Vec<String> {
    let mut tuples = Vec::new();
    let mut buf = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in values.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            if depth > 0 {
                buf.push(c);
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                if depth > 0 {
                    buf.push(c);
                }
            }
            '(' => {
                if depth > 0 {
                    buf.push(c);
                }
                depth += 1;
            }
            ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    tuples.push(std::mem::take(&mut buf));
                } else {
                    buf.push(c);
                }
            }
            _ => {
                if depth > 0 {
                    buf.push(c);
                }
            }
        }
    }

    if depth > 0 && !buf.trim().is_empty() {
        tuples.push(buf);
    }

    tuples
}

/// Split one tuple body into fields.
///
/// Quote characters are dropped; commas inside quotes do not split.
/// A trailing empty field is dropped: `1,2,` yields two fields, and so does
/// `1,2,''`. Decoders pad short rows, so this is harmless.
pub fn split_fields(row: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quote: Option<char> = None;

    for c in row.chars() {
        match quote {
            None if c == '\'' || c == '"' => {
                quote = Some(c);
            }
            Some(q) if c == q => {
                quote = None;
            }
            None if c == ',' => {
                fields.push(std::mem::take(&mut field));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() {
        fields.push(field);
    }

    fields
}

// ============================================================================
// HELPERS
// ============================================================================

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .map(|p| p.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

/// "INSERT INTO `t` VALUES ..." → ("t", "VALUES ...")
fn parse_insert_header(line: &str) -> Option<(String, &str)> {
    const KEYWORD: &str = "INSERT INTO";
    if !starts_with_ignore_case(line, KEYWORD) {
        return None;
    }

    let rest = line[KEYWORD.len()..].trim_start();
    let mut chars = rest.char_indices();
    let (_, first) = chars.next()?;

    if first == '`' || first == '"' {
        let close = rest[1..].find(first)? + 1;
        let name = &rest[1..close];
        return Some((name.to_string(), &rest[close + 1..]));
    }

    let end = rest
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    Some((rest[..end].to_string(), &rest[end..]))
}

/// Everything after the VALUES keyword, minus the terminator
fn values_section(statement: &str) -> &str {
    let upper = statement.to_ascii_uppercase();
    let body = match upper.find("VALUES") {
        Some(idx) => &statement[idx + "VALUES".len()..],
        None => statement,
    };
    body.trim_end().trim_end_matches(';')
}

fn ends_statement(line: &str) -> bool {
    line.trim_end().ends_with(';')
}

// ============================================================================
// TESTS
// ============================================================================
