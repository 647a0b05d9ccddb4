use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// One end of an A1 range. Either part may be open: `A` is a whole column,
/// `3` a whole row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    /// 0-based column index.
    pub col: Option<u32>,
    /// 1-based row number.
    pub row: Option<u32>,
}

impl CellRef {
    #[must_use]
    pub const fn new(col: u32, row: u32) -> Self {
        Self {
            col: Some(col),
            row: Some(row),
        }
    }
}

/// A range in A1 notation, e.g. `categories!A2:G2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1Range {
    pub sheet: String,
    pub start: Option<CellRef>,
    pub end: Option<CellRef>,
}

impl A1Range {
    /// The entire sheet.
    #[must_use]
    pub fn whole(sheet: &str) -> Self {
        Self {
            sheet: sheet.to_string(),
            start: None,
            end: None,
        }
    }

    /// Row 1 of the sheet.
    #[must_use]
    pub fn header(sheet: &str) -> Self {
        Self::rows_open(sheet, 1, 1)
    }

    /// A single row spanning `width` columns starting at column A.
    #[must_use]
    pub fn row(sheet: &str, row: u32, width: usize) -> Self {
        Self::rows(sheet, row, row, width)
    }

    /// Rows `first..=last` spanning `width` columns starting at column A.
    #[must_use]
    pub fn rows(sheet: &str, first: u32, last: u32, width: usize) -> Self {
        let last_col = u32::try_from(width.max(1) - 1).unwrap_or(u32::MAX);
        Self {
            sheet: sheet.to_string(),
            start: Some(CellRef::new(0, first)),
            end: Some(CellRef::new(last_col, last)),
        }
    }

    /// The cell `A1`, used as the anchor for appends.
    #[must_use]
    pub fn anchor(sheet: &str) -> Self {
        Self {
            sheet: sheet.to_string(),
            start: Some(CellRef::new(0, 1)),
            end: None,
        }
    }

    fn rows_open(sheet: &str, first: u32, last: u32) -> Self {
        Self {
            sheet: sheet.to_string(),
            start: Some(CellRef {
                col: None,
                row: Some(first),
            }),
            end: Some(CellRef {
                col: None,
                row: Some(last),
            }),
        }
    }
}

/// Converts a 0-based column index into its letter form (`0` → `A`, `26` → `AA`).
#[must_use]
pub fn column_letter(index: u32) -> String {
    let mut n = u64::from(index) + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Converts column letters into a 0-based index. Case-insensitive.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut n: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = u32::from(c.to_ascii_uppercase() as u8 - b'A') + 1;
        n = n.checked_mul(26)?.checked_add(digit)?;
    }
    Some(n - 1)
}

fn needs_quotes(sheet: &str) -> bool {
    sheet.is_empty() || !sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = self.col {
            f.write_str(&column_letter(col))?;
        }
        if let Some(row) = self.row {
            write!(f, "{row}")?;
        }
        Ok(())
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if needs_quotes(&self.sheet) {
            write!(f, "'{}'", self.sheet.replace('\'', "''"))?;
        } else {
            f.write_str(&self.sheet)?;
        }
        if let Some(start) = &self.start {
            write!(f, "!{start}")?;
            if let Some(end) = &self.end {
                write!(f, ":{end}")?;
            }
        }
        Ok(())
    }
}

fn parse_cell(s: &str) -> Result<CellRef, Error> {
    let split = s.find(|c: char| c.is_ascii_digit()).unwrap_or(s.len());
    let (letters, digits) = s.split_at(split);

    let col = if letters.is_empty() {
        None
    } else {
        Some(column_index(letters).ok_or_else(|| Error::InvalidRange(s.to_string()))?)
    };
    let row = if digits.is_empty() {
        None
    } else {
        let row: u32 = digits
            .parse()
            .map_err(|_| Error::InvalidRange(s.to_string()))?;
        if row == 0 {
            return Err(Error::InvalidRange(s.to_string()));
        }
        Some(row)
    };

    if col.is_none() && row.is_none() {
        return Err(Error::InvalidRange(s.to_string()));
    }
    Ok(CellRef { col, row })
}

impl FromStr for A1Range {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sheet, rest) = if let Some(quoted) = s.strip_prefix('\'') {
            // Quoted names escape a single quote by doubling it.
            let mut name = String::new();
            let mut chars = quoted.char_indices().peekable();
            let mut end = None;
            while let Some((i, c)) = chars.next() {
                if c == '\'' {
                    if matches!(chars.peek(), Some((_, '\''))) {
                        name.push('\'');
                        chars.next();
                    } else {
                        end = Some(i + 1);
                        break;
                    }
                } else {
                    name.push(c);
                }
            }
            let end = end.ok_or_else(|| Error::InvalidRange(s.to_string()))?;
            (name, &quoted[end..])
        } else {
            match s.find('!') {
                Some(bang) => (s[..bang].to_string(), &s[bang..]),
                None => (s.to_string(), ""),
            }
        };

        if sheet.is_empty() {
            return Err(Error::InvalidRange(s.to_string()));
        }

        let cells = if rest.is_empty() {
            None
        } else {
            Some(
                rest.strip_prefix('!')
                    .ok_or_else(|| Error::InvalidRange(s.to_string()))?,
            )
        };

        let (start, end) = match cells {
            None => (None, None),
            Some(cells) => match cells.split_once(':') {
                Some((a, b)) => (Some(parse_cell(a)?), Some(parse_cell(b)?)),
                None => (Some(parse_cell(cells)?), None),
            },
        };

        Ok(A1Range { sheet, start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn test_column_index_inverse() {
        for i in [0, 1, 25, 26, 51, 700, 702, 16383] {
            assert_eq!(column_index(&column_letter(i)), Some(i));
        }
        assert_eq!(column_index("ab"), Some(27));
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("A1"), None);
    }

    #[test]
    fn test_display_row_range() {
        let range = A1Range::row("categories", 5, 7);
        assert_eq!(range.to_string(), "categories!A5:G5");
        assert_eq!(A1Range::header("goals").to_string(), "goals!1:1");
        assert_eq!(A1Range::whole("budgets").to_string(), "budgets");
        assert_eq!(A1Range::anchor("budgets").to_string(), "budgets!A1");
    }

    #[test]
    fn test_display_quotes_sheet_names() {
        let range = A1Range::row("Bob's budget", 2, 2);
        assert_eq!(range.to_string(), "'Bob''s budget'!A2:B2");
    }

    #[test]
    fn test_parse_round_trips_display() {
        for text in [
            "categories",
            "categories!A1",
            "categories!A2:G9",
            "goals!1:1",
            "goals!A:C",
            "'My tab'!B2",
            "'Bob''s budget'!A2:B2",
        ] {
            let parsed: A1Range = text.parse().unwrap();
            assert_eq!(parsed.to_string(), text, "round trip of {text}");
        }
    }

    #[test]
    fn test_parse_components() {
        let parsed: A1Range = "'My tab'!B2:D".parse().unwrap();
        assert_eq!(parsed.sheet, "My tab");
        assert_eq!(parsed.start, Some(CellRef::new(1, 2)));
        assert_eq!(
            parsed.end,
            Some(CellRef {
                col: Some(3),
                row: None
            })
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<A1Range>().is_err());
        assert!("sheet!".parse::<A1Range>().is_err());
        assert!("sheet!A0".parse::<A1Range>().is_err());
        assert!("'unterminated!A1".parse::<A1Range>().is_err());
        assert!("sheet!A1:".parse::<A1Range>().is_err());
    }
}
