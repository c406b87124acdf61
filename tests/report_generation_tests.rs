mod common;

#[cfg(test)]
mod report_generation_tests {
    use std::sync::Arc;

    use drone_inspection_server::inspection::InspectionRecord;
    use drone_inspection_server::report::ReportError;
    use serde_json::Value;

    use crate::common::*;

    fn record(payload: Value) -> Arc<InspectionRecord> {
        Arc::new(serde_json::from_value(payload).unwrap())
    }

    #[tokio::test]
    async fn test_scenario_report_pair() {
        let ctx = test_context(true);
        let links = ctx
            .state
            .generator
            .generate_report(record(inspection_json(2)), ctx.storage.as_ref())
            .await
            .unwrap();

        assert!(links.word_url.ends_with("/s2500-07-inspection.docx"));
        assert!(links.excel_url.ends_with("/s2500-07-service-sheet.xlsx"));

        let word_key = MockObjectStorage::key_of(&links.word_url);
        let excel_key = MockObjectStorage::key_of(&links.excel_url);
        // both documents land in the same fresh folder
        assert_eq!(
            word_key.split('/').next(),
            excel_key.split('/').next()
        );

        let docx = ctx.storage.get(word_key).await.unwrap();
        let document = word_document(&docx);
        assert!(document.contains("S2500-07"));
        assert!(document.contains("15/03/24"));
        assert!(document.contains("Skyline Surveys / Sam Reyes"));
        assert!(document.contains("Visual: N/A"));
        assert!(document.contains("Deep clean: N/A"));
        assert!(!document.contains("{deep_"));
        assert!(!document.contains("clean_notes}"));
        // two photos plus four blank slots
        assert_eq!(document.matches("<w:drawing>").count(), 6);
        assert_eq!(media_count(&docx), 6);

        let xlsx = ctx.storage.get(excel_key).await.unwrap();
        let sheet = form_sheet(&xlsx);
        assert!(sheet.contains(&inline_cell("K2", Some("9"), "2024-03-15")));
        assert!(sheet.contains(&inline_cell("B2", Some("3"), "Skyline Surveys")));
        assert!(sheet.contains(&inline_cell("N2", None, "S2500-07")));
        for note_cell in ["D4", "D9", "D12", "D16", "D19", "D24"] {
            assert!(sheet.contains(&inline_cell(note_cell, None, "N/A")));
        }
    }

    #[tokio::test]
    async fn test_no_images_fills_every_slot_with_blank() {
        let ctx = test_context(true);
        let output = ctx
            .state
            .generator
            .generate(record(inspection_json(0)))
            .await
            .unwrap();

        let document = word_document(&output.word);
        assert_eq!(document.matches("<w:drawing>").count(), 6);
        assert!(!document.contains("{%image_"));
    }

    #[tokio::test]
    async fn test_blank_image_entries_render_blank_slots() {
        let ctx = test_context(true);
        let mut payload = inspection_json(0);
        payload["images"] = serde_json::json!(["", null, png_data_url()]);

        let output = ctx.state.generator.generate(record(payload)).await.unwrap();
        let document = word_document(&output.word);
        assert_eq!(document.matches("<w:drawing>").count(), 6);
        assert_eq!(media_count(&output.word), 6);
        assert!(!document.contains("{%image_"));
    }

    #[tokio::test]
    async fn test_six_images_fill_every_slot() {
        let ctx = test_context(true);
        let output = ctx
            .state
            .generator
            .generate(record(inspection_json(6)))
            .await
            .unwrap();

        assert_eq!(media_count(&output.word), 6);
        assert_eq!(word_document(&output.word).matches("r:embed=").count(), 6);
    }

    #[tokio::test]
    async fn test_battery_block_untouched_when_not_investigated() {
        let ctx = test_context(true);
        let mut payload = inspection_json(0);
        payload["batteries"] = Value::Array(vec![battery_json("TB60-1")]);

        let output = ctx.state.generator.generate(record(payload)).await.unwrap();
        let sheet = form_sheet(&output.excel);
        assert!(sheet.contains(BATTERY_ROW_TEMPLATE));
        assert!(!sheet.contains("TB60-1"));

        // the Word battery table is left blank rather than filled with N/A
        let document = word_document(&output.word);
        assert!(document.contains(r#"<w:t xml:space="preserve">Battery:    </w:t>"#));
        assert!(!document.contains("TB60-1"));
    }

    #[tokio::test]
    async fn test_battery_rows_written_when_investigated() {
        let ctx = test_context(true);
        let mut payload = inspection_json(0);
        payload["investigateBatteryHealth"] = Value::Bool(true);
        payload["batteries"] = Value::Array(vec![battery_json("TB60-1"), battery_json("TB60-2")]);

        let output = ctx.state.generator.generate(record(payload)).await.unwrap();
        let sheet = form_sheet(&output.excel);
        assert!(sheet.contains(&inline_cell("A28", Some("5"), "TB60-1")));
        assert!(sheet.contains(&inline_cell("B28", None, "TB60-1-SN")));
        assert!(sheet.contains(&inline_cell("P28", Some("5"), "42")));
        assert!(sheet.contains(&inline_cell("A29", None, "TB60-2")));

        let document = word_document(&output.word);
        assert!(document.contains("Battery: TB60-1 TB60-1-SN 42 3.9"));
    }

    #[tokio::test]
    async fn test_generation_is_repeatable() {
        let ctx = test_context(true);
        let template_path = ctx.dir.path().join("template.docx");
        let template_before = std::fs::read(&template_path).unwrap();
        let first = ctx
            .state
            .generator
            .generate(record(inspection_json(2)))
            .await
            .unwrap();
        let second = ctx
            .state
            .generator
            .generate(record(inspection_json(2)))
            .await
            .unwrap();

        assert_eq!(first.word, second.word);
        assert_eq!(first.excel, second.excel);
        assert_eq!(first.word_name, second.word_name);

        // the templates on disk are never modified
        assert_eq!(std::fs::read(&template_path).unwrap(), template_before);
    }

    #[tokio::test]
    async fn test_note_text_is_escaped_with_line_breaks() {
        let ctx = test_context(true);
        let mut payload = inspection_json(0);
        payload["visualInspectionNotes"] = Value::String("Arms & props <ok>\nGimbal loose".to_string());

        let output = ctx.state.generator.generate(record(payload)).await.unwrap();
        let document = word_document(&output.word);
        assert!(document.contains("Visual: Arms &amp; props &lt;ok&gt;</w:t><w:br/>"));
        assert!(document.contains("Gimbal loose"));

        let sheet = form_sheet(&output.excel);
        assert!(sheet.contains("Arms &amp; props &lt;ok&gt;"));
    }

    #[tokio::test]
    async fn test_missing_template_publishes_nothing() {
        let ctx = test_context(false);
        let err = ctx
            .state
            .generator
            .generate_report(record(inspection_json(1)), ctx.storage.as_ref())
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::TemplateNotFound { kind: "Word", .. }));
        assert!(ctx.storage.keys().await.is_empty());
    }
}
