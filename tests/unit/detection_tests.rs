/*!
 * Tests for defect detection and candidate verification
 */

use std::sync::Arc;

use transfix::database::{Item, ItemStatus};
use transfix::detection::{Defect, DefectKind, ProblemDetector};
use transfix::glossary::{Glossary, GlossaryEntry};
use transfix::language::{Language, Script};

fn api_glossary() -> Arc<Glossary> {
    Arc::new(Glossary::new(vec![GlossaryEntry::new(
        "API",
        "Application Programming Interface",
    )]))
}

fn zh_en() -> ProblemDetector {
    ProblemDetector::new(Language::Zh, Language::En, api_glossary())
}

#[test]
fn test_detect_mixedScriptDestination_shouldBeResidue() {
    let item = Item::new("1", "我爱编程").translated("I love 编程");
    let problem = zh_en().detect(&item).expect("residue expected");

    assert_eq!(problem.kind(), DefectKind::Residue);
    match &problem.defect {
        Defect::Residue { count, preview, .. } => {
            assert_eq!(*count, 2);
            assert_eq!(preview, "编程");
        }
        other => panic!("unexpected defect {:?}", other),
    }
}

#[test]
fn test_isCleared_afterResidueRepair_shouldHaveNoSourceScript() {
    let detector = zh_en();
    let repaired = "I love programming";

    assert!(detector.is_cleared(DefectKind::Residue, "我爱编程", repaired));
    assert!(!Script::Han.is_present(repaired));
    assert!(!detector.is_cleared(DefectKind::Residue, "我爱编程", "I love 编程"));
}

#[test]
fn test_detect_unexpandedGlossaryTerm_shouldBeGlossaryMiss() {
    let item = Item::new("2", "调用 API").translated("Call the API");
    let problem = zh_en().detect(&item).expect("glossary miss expected");

    assert_eq!(problem.kind(), DefectKind::GlossaryMiss);
    assert!(problem.details().contains("API -> Application Programming Interface"));
}

#[test]
fn test_isCleared_withExpandedTerm_shouldResolveGlossaryMiss() {
    assert!(zh_en().is_cleared(
        DefectKind::GlossaryMiss,
        "调用 API",
        "Call the Application Programming Interface"
    ));
}

#[test]
fn test_detect_cleanItem_shouldYieldNoProblem() {
    let items = vec![
        Item::new("1", "我爱编程").translated("I love programming"),
        Item::new("2", "调用 API").translated("Call the Application Programming Interface"),
        Item::new("3", "你好"),
    ];
    assert!(zh_en().detect_all(&items).is_empty());
}

#[test]
fn test_detect_failedItem_shouldBeUntranslated() {
    let mut item = Item::new("4", "你好");
    item.status = ItemStatus::Failed;

    let problem = zh_en().detect(&item).expect("untranslated expected");
    assert_eq!(problem.defect, Defect::Untranslated);
}

#[test]
fn test_detect_residueAndGlossaryMiss_shouldReportResidueOnly() {
    let item = Item::new("5", "调用 API 编程").translated("Call the API 编程");
    assert_eq!(zh_en().detect(&item).unwrap().kind(), DefectKind::Residue);
}

#[test]
fn test_detect_japaneseToChinese_shouldFlagKanaNotHan() {
    let detector = ProblemDetector::new(Language::Ja, Language::Zh, Arc::new(Glossary::default()));

    let han_only = Item::new("1", "学校に行く").translated("去学校");
    assert!(detector.detect(&han_only).is_none());

    let with_kana = Item::new("2", "学校に行く").translated("去がっこう");
    assert_eq!(detector.detect(&with_kana).unwrap().kind(), DefectKind::Residue);
}

#[test]
fn test_detect_shouldBeDeterministic() {
    let detector = zh_en();
    let item = Item::new("1", "我爱编程").translated("I love 编程");
    assert_eq!(detector.detect(&item), detector.detect(&item));
}
