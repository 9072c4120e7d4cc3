use super::*;

struct CannedModel {
    response: String,
}

impl LanguageModel for CannedModel {
    fn complete(&self, _prompt: &str) -> crate::Result<String> {
        Ok(self.response.clone())
    }
}

fn translator_with(response: &str) -> Translator {
    Translator::new(
        Arc::new(CannedModel {
            response: response.to_string(),
        }),
        SchemaDescriptor::ocean_observations(),
    )
}

#[test]
fn extract_with_marker() {
    let raw = "Here is your query.\nSQLQuery: SELECT id FROM ocean_observations LIMIT 5";
    assert_eq!(
        extract_sql(raw),
        "SELECT id FROM ocean_observations LIMIT 5"
    );
}

#[test]
fn extract_without_marker_is_verbatim() {
    let raw = "SELECT id FROM ocean_observations";
    assert_eq!(extract_sql(raw), "SELECT id FROM ocean_observations");
}

#[test]
fn extract_strips_code_fences() {
    let raw = "SQLQuery:\n```sql\nSELECT id\nFROM ocean_observations\n```";
    assert_eq!(extract_sql(raw), "SELECT id FROM ocean_observations");
}

#[test]
fn translate_produces_validated_query() {
    let translator =
        translator_with("SQLQuery: SELECT * FROM ocean_observations ORDER BY temperature_c LIMIT 3");
    let query = translator.translate("coldest three").expect("should translate");
    assert_eq!(
        query.as_str(),
        "SELECT * FROM ocean_observations ORDER BY temperature_c LIMIT 3"
    );
}

#[test]
fn prompt_names_schema() {
    let translator = translator_with("");
    let prompt = translator.build_prompt("how salty is it?");
    assert!(prompt.contains("ocean_observations"));
    assert!(prompt.contains("salinity_psu"));
    assert!(prompt.contains(SQL_MARKER));
    assert!(prompt.contains("how salty is it?"));
}

// Adversarial fixtures: anything mutating or chained must be rejected.

#[test]
fn rejects_drop() {
    let translator = translator_with("SQLQuery: DROP TABLE ocean_observations");
    let err = translator.translate("q").expect_err("DROP must be rejected");
    assert_eq!(err.kind(), "unsafe_query");
}

#[test]
fn rejects_delete() {
    let translator = translator_with("DELETE FROM ocean_observations WHERE id = 1");
    assert_eq!(
        translator.translate("q").expect_err("rejected").kind(),
        "unsafe_query"
    );
}

#[test]
fn rejects_update_and_insert() {
    for stmt in [
        "UPDATE ocean_observations SET temperature_c = 0",
        "INSERT INTO ocean_observations VALUES (1)",
    ] {
        let translator = translator_with(stmt);
        assert_eq!(
            translator.translate("q").expect_err("rejected").kind(),
            "unsafe_query"
        );
    }
}

#[test]
fn rejects_chained_statements() {
    let translator =
        translator_with("SELECT id FROM ocean_observations; DROP TABLE ocean_observations");
    assert_eq!(
        translator.translate("q").expect_err("rejected").kind(),
        "unsafe_query"
    );
}

#[test]
fn rejects_select_hiding_forbidden_keyword() {
    let translator = translator_with(
        "SELECT id FROM ocean_observations WHERE id IN (DELETE FROM ocean_observations RETURNING id)",
    );
    assert_eq!(
        translator.translate("q").expect_err("rejected").kind(),
        "unsafe_query"
    );
}

#[test]
fn rejects_table_off_allow_list() {
    let translator = translator_with("SELECT * FROM pg_shadow");
    assert_eq!(
        translator.translate("q").expect_err("rejected").kind(),
        "unsafe_query"
    );
}

#[test]
fn rejects_join_to_unlisted_table() {
    let translator = translator_with(
        "SELECT o.id FROM ocean_observations o JOIN users u ON u.id = o.id",
    );
    assert_eq!(
        translator.translate("q").expect_err("rejected").kind(),
        "unsafe_query"
    );
}

#[test]
fn allows_trailing_semicolon() {
    let schema = SchemaDescriptor::ocean_observations();
    validate_statement("SELECT id FROM ocean_observations;", &schema)
        .expect("single trailing semicolon is fine");
}

#[test]
fn allows_cte_over_allowed_table() {
    let schema = SchemaDescriptor::ocean_observations();
    validate_statement(
        "WITH coldest AS (SELECT * FROM ocean_observations ORDER BY temperature_c LIMIT 10) \
         SELECT * FROM coldest",
        &schema,
    )
    .expect("CTE over the allowed table is fine");
}

#[test]
fn allows_comma_separated_ctes() {
    let schema = SchemaDescriptor::ocean_observations();
    validate_statement(
        "WITH coldest AS (SELECT * FROM ocean_observations ORDER BY temperature_c ASC LIMIT 5), \
         warmest AS (SELECT * FROM ocean_observations ORDER BY temperature_c DESC LIMIT 5) \
         SELECT * FROM coldest UNION ALL SELECT * FROM warmest",
        &schema,
    )
    .expect("every CTE name is a legal FROM target");
}

#[test]
fn rejects_empty_statement() {
    let schema = SchemaDescriptor::ocean_observations();
    assert!(validate_statement("   ", &schema).is_err());
}

#[test]
fn column_keyword_substrings_are_not_forbidden() {
    // "created" contains CREATE as a substring; word boundaries must hold.
    let schema = SchemaDescriptor {
        table: "ocean_observations".to_string(),
        columns: vec!["created".to_string()],
    };
    validate_statement(
        "SELECT created FROM ocean_observations",
        &schema,
    )
    .expect("substring of a forbidden keyword must not trip the scan");
}
