// Release classification: pick the document list that governs a release and
// read its notice type.
use crate::types::NoticeType;
use crate::util::Node;
use serde_json::Value;
use tracing::debug;

/// Section whose `documents` list decided the notice type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentSource {
    Contract,
    Award,
    Tender,
    Planning,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub notice_type: NoticeType,
    pub source: DocumentSource,
}

/// Determine the notice type of a release.
///
/// Documents are taken from the first non-empty list of: the first
/// contract, the first award, the tender, the planning section. The notice
/// type is the `noticeType` of the last document in that list.
///
/// A first award with status `cancelled` reroutes classification to the
/// tender documents: cancellation notices reuse the award shape but are
/// terminations.
///
/// Returns `None` (release skipped) when no list has documents or the
/// governing document carries no notice type.
pub fn classify(release: &Value) -> Option<Classification> {
    let root = Node::new(release);
    let tender_docs = root.get("tender").get("documents");

    let candidates = [
        (
            DocumentSource::Contract,
            root.get("contracts").first().get("documents"),
        ),
        (
            DocumentSource::Award,
            root.get("awards").first().get("documents"),
        ),
        (DocumentSource::Tender, tender_docs),
        (
            DocumentSource::Planning,
            root.get("planning").get("documents"),
        ),
    ];
    let (mut source, mut documents) = candidates
        .into_iter()
        .find(|(_, docs)| docs.is_truthy())?;

    let first_award = root.get("awards").first();
    if root.get("awards").is_truthy() && first_award.get("status").as_str() == Some("cancelled") {
        debug!(ocid = ?root.get("ocid").as_str(), "cancelled award, classifying from tender documents");
        source = DocumentSource::Tender;
        documents = tender_docs;
    }

    let code = documents.last().get("noticeType").as_str()?;
    Some(Classification {
        notice_type: NoticeType::parse(code),
        source,
    })
}

/// True when any release tag mentions an update.
pub fn is_update(release: &Value) -> bool {
    Node::new(release)
        .get("tag")
        .items()
        .filter_map(Node::as_str)
        .any(|tag| tag.to_lowercase().contains("update"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs(code: &str) -> Value {
        json!([{"id": "d0", "noticeType": "UK1"}, {"id": "d1", "noticeType": code}])
    }

    #[test]
    fn release_without_documents_is_skipped() {
        assert!(classify(&json!({})).is_none());
        assert!(classify(&json!({"tender": {"documents": []}, "awards": []})).is_none());
        assert!(classify(&json!("not an object")).is_none());
    }

    #[test]
    fn contract_documents_win_over_everything() {
        let release = json!({
            "planning": {"documents": docs("UK2")},
            "tender": {"documents": docs("UK4")},
            "awards": [{"documents": docs("UK6")}],
            "contracts": [{"documents": docs("UK7")}],
        });
        let c = classify(&release).unwrap();
        assert_eq!(c.notice_type, NoticeType::Uk7);
        assert_eq!(c.source, DocumentSource::Contract);
    }

    #[test]
    fn falls_through_empty_lists_by_priority() {
        let release = json!({
            "planning": {"documents": docs("UK2")},
            "tender": {"documents": []},
            "contracts": [{"documents": []}],
        });
        let c = classify(&release).unwrap();
        assert_eq!(c.notice_type, NoticeType::Uk2);
        assert_eq!(c.source, DocumentSource::Planning);
    }

    #[test]
    fn uses_last_document_notice_type() {
        let release = json!({"tender": {"documents": docs("UK4")}});
        assert_eq!(classify(&release).unwrap().notice_type, NoticeType::Uk4);
    }

    #[test]
    fn cancelled_award_is_classified_from_tender_documents() {
        let release = json!({
            "tender": {"documents": docs("UK12")},
            "awards": [{"status": "cancelled", "documents": docs("UK6")}],
            "contracts": [{"documents": docs("UK7")}],
        });
        let c = classify(&release).unwrap();
        assert_eq!(c.notice_type, NoticeType::Uk12);
        assert_eq!(c.source, DocumentSource::Tender);
    }

    #[test]
    fn cancelled_award_without_tender_documents_is_skipped() {
        let release = json!({"awards": [{"status": "cancelled", "documents": docs("UK6")}]});
        assert!(classify(&release).is_none());
    }

    #[test]
    fn missing_notice_type_is_unclassifiable() {
        let release = json!({"tender": {"documents": [{"id": "d0"}]}});
        assert!(classify(&release).is_none());
    }

    #[test]
    fn update_tag_is_case_insensitive() {
        assert!(is_update(&json!({"tag": ["tenderUpdate"]})));
        assert!(is_update(&json!({"tag": ["UPDATE"]})));
        assert!(!is_update(&json!({"tag": ["tender"]})));
        assert!(!is_update(&json!({})));
    }
}
