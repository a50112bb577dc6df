//! `kvbridge view`: dump a store as a table.

use std::path::Path;

use bytes::Bytes;
use kvbridge::{with_database, OpenFlags};
use nu_ansi_term::Style;

use crate::error::{CliError, Result};

pub async fn run(path: &Path) -> Result<()> {
    let rows = read_rows(path).await?;
    print!("{}", render_table(&path.display().to_string(), &rows));
    Ok(())
}

/// Every entry in key order, decoded as lossy UTF-8.
async fn read_rows(path: &Path) -> Result<Vec<(String, String)>> {
    let db = kvbridge::open(path, OpenFlags::read_only());
    with_database(&db, |db| async move {
        let mut rows = Vec::new();
        let mut cursor = db.key_cursor();
        while let Some(key) = cursor.next().await? {
            let value = db.get_or(&key, Bytes::new()).await?;
            rows.push((
                String::from_utf8_lossy(&key).into_owned(),
                String::from_utf8_lossy(&value).into_owned(),
            ));
        }
        Ok::<_, CliError>(rows)
    })
    .await
}

fn render_table(title: &str, rows: &[(String, String)]) -> String {
    const KEY: &str = "Key";
    const VALUE: &str = "Value";

    let width = |s: &str| s.chars().count();
    let key_width = rows
        .iter()
        .map(|(k, _)| width(k))
        .chain([width(KEY)])
        .max()
        .unwrap_or(0);
    let value_width = rows
        .iter()
        .map(|(_, v)| width(v))
        .chain([width(VALUE)])
        .max()
        .unwrap_or(0);

    let rule = |left: &str, mid: &str, right: &str| {
        format!(
            "{left}{}{mid}{}{right}\n",
            "─".repeat(key_width + 2),
            "─".repeat(value_width + 2)
        )
    };
    let row = |k: &str, v: &str| {
        format!(
            "│ {k}{} │ {v}{} │\n",
            " ".repeat(key_width - width(k)),
            " ".repeat(value_width - width(v))
        )
    };

    let header = Style::new().bold();
    let mut out = format!("{}\n", Style::new().italic().paint(title));
    out.push_str(&rule("┌", "┬", "┐"));
    out.push_str(&format!(
        "│ {}{} │ {}{} │\n",
        header.paint(KEY),
        " ".repeat(key_width - width(KEY)),
        header.paint(VALUE),
        " ".repeat(value_width - width(VALUE))
    ));
    out.push_str(&rule("├", "┼", "┤"));
    for (k, v) in rows {
        out.push_str(&row(k, v));
    }
    out.push_str(&rule("└", "┴", "┘"));
    out
}
