//! Protocol schema loading. A protocol may ship a
//! `schema.sql` file with `CREATE TABLE` statements that declare indexes
//! inline (`INDEX name (col, ...)` inside the column list, a convenience
//! the Python original's tables used); SQLite has no such syntax, so this
//! splits each inline index declaration into its own
//! `CREATE INDEX IF NOT EXISTS` statement, applied after its owning table.

/// Split `sql` into individual statements ready to execute in order,
/// rewriting inline `INDEX` clauses into standalone `CREATE INDEX IF NOT
/// EXISTS` statements.
pub fn split_schema_statements(sql: &str) -> Vec<String> {
    let mut out = Vec::new();
    for raw in sql.split(';') {
        let stmt = raw.trim();
        if stmt.is_empty() {
            continue;
        }
        if stmt.to_uppercase().starts_with("CREATE TABLE") {
            let (table_stmt, indexes) = extract_inline_indexes(stmt);
            out.push(table_stmt);
            out.extend(indexes);
        } else {
            out.push(stmt.to_string());
        }
    }
    out
}

fn table_name_of(stmt: &str) -> String {
    stmt.splitn(3, char::is_whitespace)
        .nth(2)
        .and_then(|rest| rest.split('(').next())
        .unwrap_or("")
        .trim()
        .to_string()
}

fn extract_inline_indexes(stmt: &str) -> (String, Vec<String>) {
    let table_name = table_name_of(stmt);
    let mut kept_lines = Vec::new();
    let mut indexes = Vec::new();

    for line in stmt.lines() {
        let trimmed = line.trim().trim_end_matches(',');
        let upper = trimmed.to_uppercase();
        if upper.starts_with("INDEX ") || upper.starts_with("INDEX(") {
            if let Some((_, rest)) = trimmed.split_once(char::is_whitespace) {
                let rest = rest.trim();
                if let Some(paren) = rest.find('(') {
                    let idx_name = rest[..paren].trim();
                    let cols = &rest[paren..];
                    indexes.push(format!(
                        "CREATE INDEX IF NOT EXISTS {idx_name} ON {table_name}{cols}"
                    ));
                    continue;
                }
            }
        }
        kept_lines.push(line);
    }

    (kept_lines.join("\n"), indexes)
}
