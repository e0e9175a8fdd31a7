//! Tantivy schema for `ToolDocument` (§4.4 field mapping).

use tantivy::schema::{Field, STORED, STRING, Schema, TEXT};

pub struct ToolSchema {
    pub schema: Schema,
    pub tool_name: Field,
    pub full_tool_name: Field,
    pub server_name: Field,
    pub hash: Field,
    pub description: Field,
    pub params_json: Field,
    pub tags: Field,
    pub searchable_text: Field,
}

impl ToolSchema {
    pub fn build() -> Self {
        let mut builder = Schema::builder();
        // Keyword (exact) fields.
        let tool_name = builder.add_text_field("tool_name", STRING | STORED);
        let full_tool_name = builder.add_text_field("full_tool_name", STRING | STORED);
        let server_name = builder.add_text_field("server_name", STRING | STORED);
        // Stored but not indexed for search.
        let hash = builder.add_text_field("hash", STORED);
        // Tokenized fields.
        let description = builder.add_text_field("description", TEXT | STORED);
        let params_json = builder.add_text_field("params_json", TEXT | STORED);
        let tags = builder.add_text_field("tags", TEXT | STORED);
        let searchable_text = builder.add_text_field("searchable_text", TEXT | STORED);

        let schema = builder.build();
        Self {
            schema,
            tool_name,
            full_tool_name,
            server_name,
            hash,
            description,
            params_json,
            tags,
            searchable_text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_has_expected_field_count() {
        let ts = ToolSchema::build();
        assert_eq!(ts.schema.fields().count(), 8);
    }
}
