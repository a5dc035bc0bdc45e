use serde::Serialize;

/// Document format for `sari build`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Json,
    Yaml,
}

pub fn render<T: Serialize>(value: &T, format: Format) -> anyhow::Result<String> {
    Ok(match format {
        Format::Json => serde_json::to_string_pretty(value)?,
        Format::Yaml => serde_yaml::to_string(value)?,
    })
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", render(value, Format::Json)?);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    print!("{}", table(headers, rows));
}

/// Left-aligned columns, two spaces apart, with a dashed rule under the
/// header. Trailing padding is trimmed from every line.
fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:width$}"))
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };

    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    let mut out = line(headers.to_vec());
    out.push_str(&line(rule.iter().map(String::as_str).collect()));
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_fit_the_widest_cell() {
        let rows = vec![
            vec!["error".to_string(), "users.yaml: bad grant".to_string()],
            vec!["warning".to_string(), "x".to_string()],
        ];
        assert_eq!(
            table(&["LEVEL", "MESSAGE"], &rows),
            "LEVEL    MESSAGE\n\
             -------  ---------------------\n\
             error    users.yaml: bad grant\n\
             warning  x\n"
        );
    }

    #[test]
    fn yaml_rendering() {
        let value = serde_json::json!({"cloud": {"account": "123456789012"}});
        assert_eq!(
            render(&value, Format::Yaml).unwrap(),
            "cloud:\n  account: '123456789012'\n"
        );
    }
}
