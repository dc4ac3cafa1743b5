use airweave_entities::Entity;

/// Builds the textual representation the pipeline chunks and embeds: a
/// small metadata header (breadcrumb trail, entity kind) followed by the
/// entity's body. File entities without extracted text yet (no `content`
/// loaded) have no textual representation to build.
pub fn build_textual_representation(entity: &Entity) -> Option<String> {
    match entity {
        Entity::Standard(e) => {
            let header = header_line(e.entity_definition_id.as_str(), &e.breadcrumbs);
            let body = render_fields(&e.fields);
            Some(format!("{header}\n\n{body}"))
        }
        Entity::Polymorphic(e) => {
            let header = header_line(e.entity_definition_id.as_str(), &e.breadcrumbs);
            let body = render_fields(&e.fields);
            Some(format!("{header}\n\n{body}"))
        }
        Entity::File(e) => e.airweave_system_metadata.original_entity_id.as_ref().map(|_| {
            // A file entity's textual representation, when one exists, is
            // produced by content extraction upstream of this pipeline
            // (PDF/doc text extraction); absent that, there is nothing to
            // chunk and the file is embedded only as raw content at the
            // destination.
            String::new()
        }),
        Entity::Chunk(e) => Some(e.chunk_text.clone()),
        Entity::Deletion(_) => None,
    }
}

fn header_line(definition_id: &str, breadcrumbs: &[airweave_entities::Breadcrumb]) -> String {
    let trail = breadcrumbs
        .iter()
        .map(|b| b.label.as_str())
        .collect::<Vec<_>>()
        .join(" / ");
    if trail.is_empty() {
        format!("[{definition_id}]")
    } else {
        format!("[{definition_id}] {trail}")
    }
}

fn render_fields(fields: &std::collections::BTreeMap<String, serde_json::Value>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}: {}", render_value(v)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airweave_entities::{Breadcrumb, EntityDefinitionId, StandardEntity};

    #[test]
    fn standard_entity_renders_header_and_fields() {
        let mut e = StandardEntity::new("t-1", EntityDefinitionId::new("asana_task"));
        e.breadcrumbs.push(Breadcrumb::new("Project X", "p-1"));
        e.fields.insert("title".into(), serde_json::json!("Write spec"));
        let text = build_textual_representation(&Entity::Standard(e)).unwrap();
        assert!(text.contains("[asana_task] Project X"));
        assert!(text.contains("title: Write spec"));
    }
}
