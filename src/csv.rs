//! Minimal RFC 4180 reader for inventory exports.
//!
//! Handles quoted fields, doubled quotes, embedded newlines, CRLF line
//! endings, and a leading UTF-8 BOM. Rows are returned as header/value pairs.

/// Split CSV text into rows of raw fields.
pub fn parse_rows(content: &str) -> Vec<Vec<String>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows.retain(|r| r.iter().any(|f| !f.trim().is_empty()));
    rows
}

/// Parse CSV with a header row into `(header, value)` records.
///
/// Short rows leave trailing headers unset; extra cells are dropped.
pub fn parse_records(content: &str) -> Vec<Vec<(String, String)>> {
    let mut rows = parse_rows(content).into_iter();
    let Some(headers) = rows.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = headers.into_iter().map(|h| h.trim().to_string()).collect();

    rows.map(|row| {
        headers
            .iter()
            .zip(row)
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, v)| (h.clone(), v.trim().to_string()))
            .collect()
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_fields_keep_commas_quotes_and_newlines() {
        let rows = parse_rows("a,b,c\r\n\"x, y\",\"say \"\"hi\"\"\",\"line1\nline2\"\r\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["x, y", "say \"hi\"", "line1\nline2"]);
    }

    #[test]
    fn records_pair_headers_with_values() {
        let records = parse_records("\u{feff}Serial Number,User\nC02 ABC,jdoe\n\n,\nXYZ\n");
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            vec![
                ("Serial Number".to_string(), "C02 ABC".to_string()),
                ("User".to_string(), "jdoe".to_string())
            ]
        );
        assert_eq!(records[1].len(), 1);
    }

    #[test]
    fn missing_trailing_newline_still_yields_last_row() {
        let rows = parse_rows("a,b\n1,2");
        assert_eq!(rows, vec![vec!["a", "b"], vec!["1", "2"]]);
    }

    #[test]
    fn empty_input_has_no_records() {
        assert!(parse_records("").is_empty());
    }
}
