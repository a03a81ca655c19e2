// Spreadsheet export of whole tables

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Workbook, XlsxError};
use serde_json::Value;

use crate::actions::types::TableData;

const MAX_SHEET_NAME: usize = 31;

/// Write `table` as `<title>_<YYYY-MM-DD>.xlsx` under `dir`: a header row of
/// column labels, then one row per table row in column order
pub fn write_table_xlsx(table: &TableData, dir: &Path) -> Result<PathBuf, XlsxError> {
    std::fs::create_dir_all(dir).map_err(XlsxError::IoError)?;

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name(&table.title))?;

    for (col, column) in table.columns.iter().enumerate() {
        sheet.write_string(0, col as u16, column.label.as_str())?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let excel_row = (r + 1) as u32;
        for (col, column) in table.columns.iter().enumerate() {
            let col = col as u16;
            match row.get(&column.key) {
                None | Some(Value::Null) => {}
                Some(Value::Bool(b)) => {
                    sheet.write_boolean(excel_row, col, *b)?;
                }
                Some(Value::Number(n)) => match n.as_f64() {
                    Some(f) => {
                        sheet.write_number(excel_row, col, f)?;
                    }
                    None => {
                        sheet.write_string(excel_row, col, n.to_string())?;
                    }
                },
                Some(Value::String(s)) => {
                    sheet.write_string(excel_row, col, s.as_str())?;
                }
                Some(other) => {
                    sheet.write_string(excel_row, col, other.to_string())?;
                }
            }
        }
    }

    let path = dir.join(file_name(&table.title));
    workbook.save(&path)?;
    Ok(path)
}

pub fn file_name(title: &str) -> String {
    let base: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let base = if base.trim_matches('_').is_empty() { "table".to_string() } else { base };
    format!("{}_{}.xlsx", base, chrono::Utc::now().format("%Y-%m-%d"))
}

/// Excel sheet names: at most 31 chars, none of `[]:*?/\`
fn sheet_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(MAX_SHEET_NAME)
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'').to_string();
    if cleaned.is_empty() {
        "Table".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::types::TableColumn;
    use serde_json::json;

    #[test]
    fn sanitizes_sheet_names() {
        assert_eq!(sheet_name("Q1: Sales [draft]"), "Q1 Sales draft");
        assert_eq!(sheet_name(""), "Table");
        assert_eq!(sheet_name(&"x".repeat(40)).len(), 31);
    }

    #[test]
    fn file_name_is_dated_and_safe() {
        let name = file_name("My Table/2024");
        assert!(name.starts_with("My_Table_2024_"));
        assert!(name.ends_with(".xlsx"));
        assert!(file_name("???").starts_with("table_"));
    }

    #[test]
    fn writes_a_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let table = TableData {
            key: "t1".into(),
            title: "Planets".into(),
            columns: vec![
                TableColumn { key: "name".into(), label: "Name".into(), icon: None },
                TableColumn { key: "moons".into(), label: "Moons".into(), icon: None },
            ],
            rows: vec![
                json!({"id": "1", "name": "Earth", "moons": 1}).as_object().cloned().unwrap(),
                json!({"id": "2", "name": "Mars", "moons": 2, "extra": true}).as_object().cloned().unwrap(),
            ],
            actions: vec![],
        };

        let path = write_table_xlsx(&table, dir.path()).unwrap();
        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
