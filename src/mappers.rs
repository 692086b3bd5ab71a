// Schema mappers: one flat record per classified release (plus one per lot
// and per award where those apply).
//
// Every mapper emits the full column list of its sheet; absent source data
// becomes the missing marker (or the field's own declared default), never an
// omitted column.
use crate::classify::{is_update, Classification};
use crate::types::{Family, NoticeType, Record, MISSING};
use crate::util::{parse_timestamp_safe, whole_days_between, Node};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

const SEE_LOTS_CPV: &str = "See lots sheet for CPV codes";
const SEE_LOTS_CRITERIA: &str = "Detailed in lots sheet";
const SEE_AWARDS_SHEET: &str = "See awards sheet";
const REFER_TO_NOTICE: &str = "Refer to notice for detailed weightings";
const ABOVE_THRESHOLD: &str = "Above the relevant threshold";
const BELOW_THRESHOLD: &str = "Below the relevant threshold";

/// Award-notice columns whose data lives either on the award or on the
/// contract, depending on notice type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AwardField {
    Amount,
    AmountGross,
    Currency,
    Threshold,
    StartDate,
    EndDate,
    /// Currency column of the per-award sheet.
    LineCurrency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Award,
    Contract,
}

impl Source {
    fn period_key(self) -> &'static str {
        match self {
            Source::Award => "contractPeriod",
            Source::Contract => "period",
        }
    }
}

// Contract details notices (UK7) report money and dates from the signed
// contract; every other award-family notice reads them from the award.
static SOURCE_TABLE: Lazy<HashMap<(NoticeType, AwardField), Source>> = Lazy::new(|| {
    use AwardField::*;
    let mut table = HashMap::new();
    for field in [Amount, AmountGross, Currency, Threshold, StartDate, EndDate] {
        table.insert((NoticeType::Uk7, field), Source::Contract);
    }
    table.insert((NoticeType::Uk7, LineCurrency), Source::Award);
    table
});

pub fn source_for(notice_type: &NoticeType, field: AwardField) -> Source {
    SOURCE_TABLE
        .get(&(notice_type.clone(), field))
        .copied()
        .unwrap_or(Source::Award)
}

/// Resolve an award-derived field against the award or the first contract.
fn sourced<'a>(
    notice_type: &NoticeType,
    award: Node<'a>,
    contract: Node<'a>,
    field: AwardField,
) -> Node<'a> {
    let source = source_for(notice_type, field);
    let section = match source {
        Source::Award => award,
        Source::Contract => contract,
    };
    match field {
        AwardField::Amount => section.get("value").get("amount"),
        AwardField::AmountGross => section.get("value").get("amountGross"),
        AwardField::Currency | AwardField::LineCurrency => section.get("value").get("currency"),
        AwardField::Threshold => section.get("aboveThreshold"),
        AwardField::StartDate => section.get(source.period_key()).get("startDate"),
        AwardField::EndDate => section.get(source.period_key()).get("endDate"),
    }
}

/// A classified release with the paths every mapper reads.
pub struct Notice<'a> {
    pub release: Node<'a>,
    pub tender: Node<'a>,
    pub lots: Node<'a>,
    pub notice_type: NoticeType,
    pub is_update: bool,
}

impl<'a> Notice<'a> {
    pub fn new(release: &'a Value, notice_type: NoticeType) -> Self {
        let root = Node::new(release);
        let tender = root.get("tender");
        Self {
            release: root,
            tender,
            lots: tender.get("lots"),
            notice_type,
            is_update: is_update(release),
        }
    }

    fn first_lot(&self) -> Node<'a> {
        self.lots.first()
    }

    fn first_award(&self) -> Node<'a> {
        self.release.get("awards").first()
    }

    fn first_contract(&self) -> Node<'a> {
        self.release.get("contracts").first()
    }

    fn contact(&self) -> Node<'a> {
        self.release.get("parties").first().get("contactPoint")
    }

    /// OCID, notice type and update flag: the key columns of every sheet.
    fn key_fields(&self) -> Record {
        vec![
            ("OCID", self.release.get("ocid").or_missing()),
            ("Notice Type", Value::from(self.notice_type.code())),
            ("Is Update", Value::Bool(self.is_update)),
        ]
    }

    fn heading_fields(&self) -> Record {
        vec![
            ("Published Date", self.release.get("date").or_missing()),
            ("Notice ID", self.release.get("id").or_missing()),
            ("Reference", self.tender.get("id").or_missing()),
            ("Notice Title", self.tender.get("title").or_missing()),
        ]
    }

    fn buyer_fields(&self) -> Record {
        vec![
            ("Contracting Authority", self.release.get("buyer").get("name").or_missing()),
            ("PPON", self.release.get("buyer").get("id").or_missing()),
            ("Contact Name", self.contact().get("name").or_missing()),
            ("Contact Email", self.contact().get("email").or_missing()),
        ]
    }

    fn tender_value_fields(&self) -> Record {
        let value = self.tender.get("value");
        vec![
            ("Value ex VAT", value.get("amount").or_missing()),
            ("Value inc VAT", value.get("amountGross").or_missing()),
            ("Currency", value.get("currency").or_missing()),
            ("Threshold", threshold(self.tender.get("aboveThreshold"))),
            ("Contract Start Date", self.first_lot().get("contractPeriod").get("startDate").or_missing()),
            ("Contract End Date", self.first_lot().get("contractPeriod").get("endDate").or_missing()),
        ]
    }

    /// CPV of the single lot's first item, or a pointer to the lots sheet.
    fn cpv_code(&self) -> Value {
        if self.lots.len() == 1 {
            first_classification_id(self.tender.get("items").first())
        } else {
            Value::from(SEE_LOTS_CPV)
        }
    }

    fn award_criteria(&self) -> Value {
        if self.lots.len() > 1 {
            Value::from(SEE_LOTS_CRITERIA)
        } else {
            criteria_text(self.first_lot())
        }
    }

    fn framework_fields(&self) -> Record {
        let techniques = self.tender.get("techniques");
        vec![
            ("Framework Agreement", framework_label(techniques.get("type").as_str())),
            (
                "Call off method",
                call_off_label(techniques.get("frameworkAgreement").get("method").as_str()),
            ),
        ]
    }
}

fn threshold(flag: Node<'_>) -> Value {
    Value::from(if flag.is_truthy() { ABOVE_THRESHOLD } else { BELOW_THRESHOLD })
}

fn first_classification_id(item: Node<'_>) -> Value {
    item.get("additionalClassifications").first().get("id").or_missing()
}

/// Free-text criteria when no structured criteria are listed.
fn criteria_text(lot: Node<'_>) -> Value {
    let criteria = lot.get("awardCriteria");
    if criteria.get("criteria").is_truthy() {
        Value::from(REFER_TO_NOTICE)
    } else {
        criteria.get("description").or_missing()
    }
}

pub fn framework_label(kind: Option<&str>) -> Value {
    Value::from(match kind {
        Some("closed") => "Closed Framework",
        Some("open") => "Open Framework",
        _ => MISSING,
    })
}

pub fn call_off_label(method: Option<&str>) -> Value {
    Value::from(match method {
        Some("withReopeningCompetition") => "With competition",
        Some("withoutReopeningCompetition") => "Without competition",
        Some("withAndWithoutReopeningCompetition") => "Either with or without competition",
        _ => MISSING,
    })
}

/// Whole days from contract signature to publication, or `""` when either
/// date is absent or unparseable.
fn days_to_award(notice: &Notice<'_>) -> Value {
    let published = parse_timestamp_safe(notice.release.get("date").as_str());
    let signed = parse_timestamp_safe(notice.first_contract().get("dateSigned").as_str());
    match (signed, published) {
        (Some(signed), Some(published)) => Value::from(whole_days_between(signed, published)),
        _ => Value::from(""),
    }
}

fn join_suppliers(award: Node<'_>, key: &str) -> Value {
    let parts: Vec<&str> = award
        .get("suppliers")
        .items()
        .map(|supplier| supplier.get(key).as_str().unwrap_or(MISSING))
        .collect();
    Value::from(parts.join(", "))
}

fn bid_statistic(notice: &Notice<'_>, measure: &str) -> Value {
    notice
        .release
        .get("bids")
        .get("statistics")
        .items()
        .find(|stat| stat.get("measure").as_str() == Some(measure))
        .map_or_else(|| Value::from(MISSING), |stat| stat.get("value").or_missing())
}

pub fn planning(notice: &Notice<'_>) -> Record {
    let mut record = notice.key_fields();
    record.extend(notice.heading_fields());
    record.push(("Notice Description", notice.tender.get("description").or_missing()));
    record.extend(notice.tender_value_fields());
    record.extend([
        (
            "Publication date of tender notice (estimated)",
            notice.tender.get("communication").get("futureNoticeDate").or_missing(),
        ),
        ("Main Category", notice.tender.get("mainProcurementCategory").or_missing()),
        ("CPV Code", notice.cpv_code()),
        ("Submission Deadline", notice.tender.get("tenderPeriod").get("endDate").or_missing()),
        (
            "Enquiry Deadline",
            notice.release.get("planning").get("milestones").first().get("dueDate").or_missing(),
        ),
        ("Estimated Award Date", notice.tender.get("awardPeriod").get("endDate").or_missing()),
        ("Award Criteria", notice.award_criteria()),
    ]);
    record.extend(notice.framework_fields());
    record.extend([
        ("Procedure Type", notice.tender.get("procurementMethodDetails").or_missing()),
        ("Procedure Description", notice.tender.get("procedure").get("features").or_missing()),
    ]);
    record.extend(notice.buyer_fields());
    record
}

pub fn tender(notice: &Notice<'_>) -> Record {
    let first_lot = notice.first_lot();
    let suitability: Vec<&str> = [
        (first_lot.get("suitability").get("sme"), "SME"),
        (first_lot.get("suitability").get("vcse"), "VCSE"),
    ]
    .into_iter()
    .filter(|(flag, _)| flag.is_truthy())
    .map(|(_, label)| label)
    .collect();
    let suitability = if suitability.is_empty() {
        MISSING.to_string()
    } else {
        suitability.join(", ")
    };

    let mut record = notice.key_fields();
    record.extend(notice.heading_fields());
    record.push(("Notice Description", notice.tender.get("description").or_missing()));
    record.extend(notice.tender_value_fields());
    record.extend([
        ("Renewal", notice.tender.get("renewal").get("description").or_missing()),
        ("Options", notice.tender.get("options").get("description").or_missing()),
        ("Main Category", notice.tender.get("mainProcurementCategory").or_missing()),
        ("CPV Code", notice.cpv_code()),
        ("Particular Suitability", Value::from(suitability)),
        ("Submission Deadline", notice.tender.get("tenderPeriod").get("endDate").or_missing()),
        ("Submission Method", notice.tender.get("submissionMethodDetails").or_missing()),
        ("Enquiry Deadline", notice.tender.get("enquiryPeriod").get("endDate").or_missing()),
        ("Estimated Award Date", notice.tender.get("awardPeriod").get("endDate").or_missing()),
        ("Award Criteria", notice.award_criteria()),
    ]);
    record.extend(notice.framework_fields());
    record.push(("Procedure Type", notice.tender.get("procurementMethodDetails").or_missing()));
    record.extend(notice.buyer_fields());
    record
}

pub fn termination(notice: &Notice<'_>) -> Record {
    let mut record = notice.key_fields();
    record.extend(notice.heading_fields());
    record.push(("Cancellation Reason", notice.first_award().get("statusDetails").or_missing()));
    record
}

pub fn award_notice<'a>(notice: &Notice<'a>) -> Record {
    let award = notice.first_award();
    let contract = notice.first_contract();
    let milestone = award.get("milestones").first();
    let earliest_signature = if milestone.get("type").as_str() == Some("futureSignatureDate") {
        milestone.get("dueDate").or_missing()
    } else {
        Value::from(MISSING)
    };
    let main_category = if notice.notice_type.is_award_or_contract() {
        Value::from(SEE_AWARDS_SHEET)
    } else {
        award.get("mainProcurementCategory").or_missing()
    };

    let from = |field| sourced(&notice.notice_type, award, contract, field);

    let mut record = notice.key_fields();
    record.extend(notice.heading_fields());
    record.extend([
        ("Notice Description", notice.tender.get("description").or_missing()),
        ("Awarded Amount ex VAT", from(AwardField::Amount).or_missing()),
        ("Awarded Amount inc VAT", from(AwardField::AmountGross).or_missing()),
        ("Currency", from(AwardField::Currency).or_missing()),
        ("Threshold", threshold(from(AwardField::Threshold))),
        ("Earliest date the contract will be signed", earliest_signature),
        ("Contract Start Date", from(AwardField::StartDate).or_missing()),
        ("Contract End Date", from(AwardField::EndDate).or_missing()),
        ("Contract Signature Date", contract.get("dateSigned").or_missing()),
        ("Suppliers", join_suppliers(award, "name")),
        ("Supplier ID", join_suppliers(award, "id")),
        ("Main Category", main_category),
        ("CPV Code", notice.cpv_code()),
        ("Submission Deadline", notice.tender.get("tenderPeriod").get("endDate").or_missing()),
        ("Procurement Method", notice.tender.get("procurementMethodDetails").or_missing()),
        ("Number of Tenders received", bid_statistic(notice, "bids")),
        ("Number of Tenders assessed", bid_statistic(notice, "finalStageBids")),
        ("Award decision date", award.get("date").or_missing()),
        ("Date assessment summaries sent", award.get("assessmentSummariesDateSent").or_missing()),
    ]);
    record.extend(notice.buyer_fields());
    record.push(("Days to Award", days_to_award(notice)));
    record
}

/// One row of the awards sheet, for a single entry of `awards`.
pub fn award_line<'a>(notice: &Notice<'a>, award: Node<'a>) -> Record {
    let main_category = match award.get("mainProcurementCategory").value() {
        Some(category) => category.clone(),
        None => notice.tender.get("mainProcurementCategory").or_missing(),
    };
    let cpv = award
        .get("items")
        .items()
        .find(|item| item.get("additionalClassifications").is_truthy())
        .map_or_else(|| Value::from(MISSING), first_classification_id);

    vec![
        ("OCID", notice.release.get("ocid").or_missing()),
        ("Notice Type", Value::from(notice.notice_type.code())),
        ("Notice ID", notice.release.get("id").or_missing()),
        ("Published Date", notice.release.get("date").or_missing()),
        ("Is Update", Value::Bool(notice.is_update)),
        ("Contract Title", award.get("title").or_missing()),
        ("Value ex VAT", award_line_field(notice, award, AwardField::Amount)),
        ("Value inc VAT", award_line_field(notice, award, AwardField::AmountGross)),
        ("Currency", award_line_field(notice, award, AwardField::LineCurrency)),
        ("Suppliers", join_suppliers(award, "name")),
        ("Contract Start Date", award_line_field(notice, award, AwardField::StartDate)),
        ("Contract End Date", award_line_field(notice, award, AwardField::EndDate)),
        ("Main Category", main_category),
        ("CPV Code", cpv),
    ]
}

fn award_line_field<'a>(notice: &Notice<'a>, award: Node<'a>, field: AwardField) -> Value {
    sourced(&notice.notice_type, award, notice.first_contract(), field).or_missing()
}

/// One row of the lots sheet; `number` is the 1-based lot position.
pub fn lot(notice: &Notice<'_>, entry: Node<'_>, number: usize) -> Record {
    let lot_id = entry.get("id").value();
    let cpv = notice
        .tender
        .get("items")
        .items()
        .find(|item| lot_id.is_some() && item.get("relatedLot").value() == lot_id)
        .map_or_else(|| Value::from(MISSING), first_classification_id);
    let suitability = entry.get("suitability");

    let mut record = notice.key_fields();
    record.extend([
        ("Lot Number", Value::from(number)),
        ("Lot Title", entry.get("title").or_missing()),
        ("Lot Description", entry.get("description").or_missing()),
        ("Lot Value ex VAT", entry.get("value").get("amount").or_missing()),
        ("Lot Value inc VAT", entry.get("value").get("amountGross").or_missing()),
        ("Lot Currency", entry.get("value").get("currency").or_missing()),
        ("Lot Start Date", entry.get("contractPeriod").get("startDate").or_missing()),
        ("Lot End Date", entry.get("contractPeriod").get("endDate").or_missing()),
        ("SME Suitable", suitability.get("sme").or(false)),
        ("VCSE Suitable", suitability.get("vcse").or(false)),
        ("Award Criteria", criteria_text(entry)),
        ("CPV Code", cpv),
    ]);
    record
}

/// Records produced by one release, grouped by destination sheet.
#[derive(Debug, Default)]
pub struct Mapped {
    pub planning: Option<Record>,
    pub tender: Option<Record>,
    pub award_notice: Option<Record>,
    pub termination: Option<Record>,
    pub lots: Vec<Record>,
    pub award_lines: Vec<Record>,
}

impl Mapped {
    pub fn is_empty(&self) -> bool {
        self.planning.is_none()
            && self.tender.is_none()
            && self.award_notice.is_none()
            && self.termination.is_none()
            && self.lots.is_empty()
            && self.award_lines.is_empty()
    }
}

/// Dispatch a classified release to the mappers for its family.
///
/// Multi-lot tenders additionally get one lot row per lot for planning,
/// tender and award-family notices. UK6/UK7 notices get one award row per
/// entry of `awards`.
pub fn map_release(release: &Value, classification: &Classification) -> Mapped {
    let notice = Notice::new(release, classification.notice_type.clone());
    let mut mapped = Mapped::default();

    match notice.notice_type.family() {
        Some(Family::Planning) => {
            if !notice.release.get("planning").exists() {
                return mapped;
            }
            mapped.planning = Some(planning(&notice));
        }
        Some(Family::Tender) => mapped.tender = Some(tender(&notice)),
        Some(Family::Termination) => {
            mapped.termination = Some(termination(&notice));
            return mapped;
        }
        Some(Family::AwardNotice) => {
            mapped.award_notice = Some(award_notice(&notice));
            if notice.notice_type.is_award_or_contract() {
                mapped.award_lines = notice
                    .release
                    .get("awards")
                    .items()
                    .map(|award| award_line(&notice, award))
                    .collect();
            }
        }
        None => return mapped,
    }

    if notice.lots.len() > 1 {
        mapped.lots = notice
            .lots
            .items()
            .enumerate()
            .map(|(idx, each)| lot(&notice, each, idx + 1))
            .collect();
    }
    mapped
}
