use crate::classify::classify;
use crate::mappers::map_release;
use crate::sanitize::{sanitize_record, scrub};
use crate::types::{Cell, OrgFilter, RecordSet, Report, SummaryRow};
use crate::util::{format_int, parse_timestamp_safe, whole_days_between};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

pub const PLANNING_SHEET: &str = "Planning_Notices";
pub const TENDER_SHEET: &str = "Tender_Notices";
pub const AWARD_NOTICE_SHEET: &str = "Award_Notices";
pub const LOTS_SHEET: &str = "Lots";
pub const AWARDS_SHEET: &str = "Awards";
pub const TERMINATION_SHEET: &str = "Procurement_Terminations";
pub const CLOSED_SHEET: &str = "Closed_Unawarded_Notices";
pub const SUMMARY_SHEET: &str = "Days_to_Award_Summary";

/// Bucket labels with their right-inclusive upper bounds.
pub const BUCKETS: [(&str, f64); 3] = [("0-30", 30.0), ("31-60", 60.0), ("61+", f64::INFINITY)];

/// Days past the deadline after which a missing award notice is overdue.
const RECENTLY_CLOSED_DAYS: i64 = 30;

// Tender columns carried into the closed-unawarded sheet.
const CLOSED_COLUMNS: [&str; 9] = [
    "OCID",
    "Notice Type",
    "Notice Title",
    "Submission Deadline",
    "Published Date",
    "Value ex VAT",
    "Contracting Authority",
    "Contact Name",
    "Contact Email",
];

/// Run one full transformation pass over a batch of releases.
///
/// Releases outside the organisation filter are dropped, the rest are
/// classified and mapped into the six sheets, sanitized, and then used to
/// derive the closed-unawarded sheet and the day-count summary. The result
/// depends only on the arguments.
pub fn build_report(releases: &[Value], now: DateTime<Utc>, filter: &OrgFilter) -> Report {
    let mut planning = RecordSet::new(PLANNING_SHEET);
    let mut tenders = RecordSet::new(TENDER_SHEET);
    let mut award_notices = RecordSet::new(AWARD_NOTICE_SHEET);
    let mut lots = RecordSet::new(LOTS_SHEET);
    let mut award_lines = RecordSet::new(AWARDS_SHEET);
    let mut terminations = RecordSet::new(TERMINATION_SHEET);

    let mut matched = 0usize;
    let mut skipped = 0usize;
    for release in releases.iter().filter(|r| filter.matches(r)) {
        matched += 1;
        let Some(classification) = classify(release) else {
            skipped += 1;
            continue;
        };
        let mapped = map_release(release, &classification);
        if mapped.is_empty() {
            debug!(
                notice_type = %classification.notice_type,
                source = ?classification.source,
                "no sheet for notice type"
            );
        }
        if let Some(r) = mapped.planning {
            planning.push(sanitize_record(r));
        }
        if let Some(r) = mapped.tender {
            tenders.push(sanitize_record(r));
        }
        if let Some(r) = mapped.award_notice {
            award_notices.push(sanitize_record(r));
        }
        if let Some(r) = mapped.termination {
            terminations.push(sanitize_record(r));
        }
        for r in mapped.lots {
            lots.push(sanitize_record(r));
        }
        for r in mapped.award_lines {
            award_lines.push(sanitize_record(r));
        }
    }
    info!(
        releases = %format_int(releases.len()),
        matched = %format_int(matched),
        unclassified = skipped,
        "classified releases"
    );

    let mut closed_unawarded =
        generate_closed_unawarded(&tenders, &award_notices, &terminations, now);
    let summary = generate_summary(&award_notices, &closed_unawarded);

    for set in [
        &mut planning,
        &mut tenders,
        &mut award_notices,
        &mut lots,
        &mut award_lines,
        &mut terminations,
        &mut closed_unawarded,
    ] {
        set.map_cells(scrub);
        info!(sheet = set.sheet(), rows = set.len(), "sheet ready");
    }

    Report {
        generated_at: now,
        planning,
        tenders,
        award_notices,
        lots,
        award_lines,
        terminations,
        closed_unawarded,
        summary,
    }
}

/// Tenders whose submission deadline has passed with neither an award nor a
/// termination published for the same OCID.
///
/// - Only UK4 rows are considered, latest `Published Date` per OCID (ties:
///   the later row in input order).
/// - Unparseable deadlines never count as closed.
/// - Award notices only count as awarded when they are UK6 or UK7.
/// - Output is ordered by OCID.
pub fn generate_closed_unawarded(
    tenders: &RecordSet,
    award_notices: &RecordSet,
    terminations: &RecordSet,
    now: DateTime<Utc>,
) -> RecordSet {
    let mut out = RecordSet::new(CLOSED_SHEET);
    if tenders.is_empty() {
        info!("no tender notices found");
        return out;
    }

    let mut uk4: Vec<usize> = (0..tenders.len())
        .filter(|&i| text(tenders.get(i, "Notice Type")) == "UK4")
        .collect();
    if uk4.is_empty() {
        info!("no UK4 notices found");
        return out;
    }

    // Stable sort: equal dates keep input order, so the later row wins below.
    uk4.sort_by_key(|&i| parse_timestamp_safe(Some(text(tenders.get(i, "Published Date")).as_str())));
    let mut latest: BTreeMap<String, usize> = BTreeMap::new();
    for i in uk4 {
        latest.insert(text(tenders.get(i, "OCID")), i);
    }

    let closed: Vec<(String, usize, DateTime<Utc>)> = latest
        .into_iter()
        .filter_map(|(ocid, i)| {
            let deadline =
                parse_timestamp_safe(Some(text(tenders.get(i, "Submission Deadline")).as_str()))?;
            (deadline < now).then_some((ocid, i, deadline))
        })
        .collect();

    let terminated: HashSet<String> = terminations.column_values("OCID").map(Cell::to_string).collect();
    let before = closed.len();
    let closed: Vec<_> = closed
        .into_iter()
        .filter(|(ocid, _, _)| !terminated.contains(ocid))
        .collect();
    info!(excluded = before - closed.len(), "excluded closed tenders from terminated procurements");
    if closed.is_empty() {
        info!("no closed tenders found");
        return out;
    }

    let awarded: HashSet<String> = if award_notices.is_empty() {
        info!("no award notices found, treating all closed tenders as unawarded");
        HashSet::new()
    } else {
        (0..award_notices.len())
            .filter(|&i| matches!(text(award_notices.get(i, "Notice Type")).as_str(), "UK6" | "UK7"))
            .map(|i| text(award_notices.get(i, "OCID")))
            .collect()
    };

    let added = now.format("%Y-%m-%dT%H:%M:%S%z").to_string();
    for (ocid, i, deadline) in closed {
        if awarded.contains(&ocid) {
            continue;
        }
        let days = whole_days_between(deadline, now);
        let status = if days <= RECENTLY_CLOSED_DAYS {
            "Recently Closed"
        } else {
            "Overdue Award Notice"
        };
        let mut row: Vec<(&'static str, Cell)> = CLOSED_COLUMNS
            .iter()
            .map(|&col| (col, tenders.get(i, col).cloned().unwrap_or_else(Cell::empty)))
            .collect();
        row.push(("Date Added to Report", Cell::Text(added.clone())));
        row.push(("Days Since Closed", Cell::Int(days)));
        row.push(("Status", Cell::Text(status.to_string())));
        out.push(row);
    }
    info!(count = out.len(), "closed tenders without award notices");
    out
}

fn text(cell: Option<&Cell>) -> String {
    cell.map(Cell::to_string).unwrap_or_default()
}

/// Count day values per bucket.
///
/// Buckets are half-open on the left, `(0, 30]`, `(30, 60]`, `(60, inf]`:
/// `30` is "0-30" and `31` is "31-60". Zero, negative, non-finite and
/// non-numeric values are left out of every bucket.
pub fn bucketize<'a>(values: impl IntoIterator<Item = &'a Cell>) -> Vec<(&'static str, usize)> {
    let mut counts: Vec<(&'static str, usize)> = BUCKETS.iter().map(|(label, _)| (*label, 0)).collect();
    for value in values {
        let Some(days) = value.as_f64() else {
            continue;
        };
        if !days.is_finite() || days <= 0.0 {
            continue;
        }
        if let Some(slot) = BUCKETS.iter().position(|(_, upper)| days <= *upper) {
            counts[slot].1 += 1;
        }
    }
    counts
}

/// Award turnaround and closed-unawarded counts side by side, one row per
/// bucket label.
pub fn generate_summary(award_notices: &RecordSet, closed: &RecordSet) -> Vec<SummaryRow> {
    let awards = bucketize(award_notices.column_values("Days to Award"));
    let closed = bucketize(closed.column_values("Days Since Closed"));
    BUCKETS
        .iter()
        .map(|(label, _)| {
            let count_for = |counts: &[(&str, usize)]| {
                counts
                    .iter()
                    .find(|(l, _)| l == label)
                    .map_or(0, |(_, n)| *n)
            };
            SummaryRow {
                range: label.to_string(),
                award_count: count_for(&awards),
                closed_unawarded_count: count_for(&closed),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 2, 15, 0, 0, 0).unwrap()
    }

    fn uk4(ocid: &str, published: &str, deadline: &str, title: &str) -> Value {
        json!({
            "ocid": ocid,
            "date": published,
            "tender": {
                "title": title,
                "documents": [{"noticeType": "UK4"}],
                "tenderPeriod": {"endDate": deadline},
            }
        })
    }

    fn notice(ocid: &str, code: &str) -> Value {
        match code {
            "UK12" => json!({
                "ocid": ocid,
                "tender": {"documents": [{"noticeType": "UK12"}]},
                "awards": [{"status": "cancelled"}],
            }),
            _ => json!({"ocid": ocid, "awards": [{"documents": [{"noticeType": code}]}]}),
        }
    }

    fn run(releases: &[Value]) -> Report {
        build_report(releases, now(), &OrgFilter::All)
    }

    #[test]
    fn overdue_tender_without_award_or_termination() {
        let report = run(&[uk4("ocds-abc-1", "2019-12-01T00:00:00Z", "2020-01-01T00:00:00+00:00", "Roads")]);
        let closed = &report.closed_unawarded;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed.get(0, "OCID"), Some(&Cell::Text("ocds-abc-1".into())));
        assert_eq!(closed.get(0, "Days Since Closed"), Some(&Cell::Int(45)));
        assert_eq!(closed.get(0, "Status"), Some(&Cell::Text("Overdue Award Notice".into())));
        assert_eq!(
            closed.get(0, "Date Added to Report"),
            Some(&Cell::Text("2020-02-15T00:00:00+0000".into()))
        );
        assert_eq!(closed.columns().len(), CLOSED_COLUMNS.len() + 3);
    }

    #[test]
    fn termination_removes_closed_tender() {
        let report = run(&[
            uk4("ocds-abc-1", "2019-12-01T00:00:00Z", "2020-01-01T00:00:00+00:00", "Roads"),
            notice("ocds-abc-1", "UK12"),
        ]);
        assert_eq!(report.terminations.len(), 1);
        assert!(report.closed_unawarded.is_empty());
    }

    #[test]
    fn only_award_and_contract_notices_count_as_awarded() {
        let report = run(&[
            uk4("a", "2019-12-01T00:00:00Z", "2020-01-01T00:00:00Z", "A"),
            uk4("b", "2019-12-01T00:00:00Z", "2020-01-01T00:00:00Z", "B"),
            uk4("c", "2019-12-01T00:00:00Z", "2020-01-01T00:00:00Z", "C"),
            notice("a", "UK6"),
            notice("b", "UK7"),
            notice("c", "UK5"),
        ]);
        let ocids: Vec<String> = report.closed_unawarded.column_values("OCID").map(Cell::to_string).collect();
        assert_eq!(ocids, vec!["c"]);
    }

    #[test]
    fn latest_tender_per_ocid_decides() {
        // The newer notice moved the deadline into the future.
        let report = run(&[
            uk4("x", "2019-12-05T00:00:00Z", "2020-03-01T00:00:00Z", "Extended"),
            uk4("x", "2019-12-01T00:00:00Z", "2020-01-01T00:00:00Z", "Original"),
        ]);
        assert_eq!(report.tenders.len(), 2);
        assert!(report.closed_unawarded.is_empty());

        let report = run(&[
            uk4("y", "2019-12-01T00:00:00Z", "2020-03-01T00:00:00Z", "Original"),
            uk4("y", "2019-12-05T00:00:00Z", "2020-02-01T00:00:00Z", "Shortened"),
        ]);
        let closed = &report.closed_unawarded;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed.get(0, "Notice Title"), Some(&Cell::Text("Shortened".into())));
        assert_eq!(closed.get(0, "Status"), Some(&Cell::Text("Recently Closed".into())));
    }

    #[test]
    fn thirty_days_is_recent_and_thirty_one_overdue() {
        let report = run(&[
            uk4("p", "2019-12-01T00:00:00Z", "2020-01-16T00:00:00Z", "Thirty"),
            uk4("q", "2019-12-01T00:00:00Z", "2020-01-15T00:00:00Z", "Thirty-one"),
        ]);
        let closed = &report.closed_unawarded;
        assert_eq!(closed.len(), 2);
        assert_eq!(closed.get(0, "Days Since Closed"), Some(&Cell::Int(30)));
        assert_eq!(closed.get(0, "Status"), Some(&Cell::Text("Recently Closed".into())));
        assert_eq!(closed.get(1, "Days Since Closed"), Some(&Cell::Int(31)));
        assert_eq!(closed.get(1, "Status"), Some(&Cell::Text("Overdue Award Notice".into())));
    }

    #[test]
    fn equal_publication_dates_keep_the_later_row() {
        let report = run(&[
            uk4("z", "2019-12-01T00:00:00Z", "2020-01-01T00:00:00Z", "First"),
            uk4("z", "2019-12-01T00:00:00Z", "2020-01-02T00:00:00Z", "Second"),
        ]);
        assert_eq!(
            report.closed_unawarded.get(0, "Notice Title"),
            Some(&Cell::Text("Second".into()))
        );
    }

    #[test]
    fn unparseable_or_future_deadlines_are_not_closed() {
        let report = run(&[
            uk4("a", "2019-12-01T00:00:00Z", "soon", "A"),
            uk4("b", "2019-12-01T00:00:00Z", "2020-02-15T00:00:00Z", "B"),
            json!({"ocid": "c", "tender": {"documents": [{"noticeType": "UK4"}]}}),
        ]);
        assert_eq!(report.tenders.len(), 3);
        assert!(report.closed_unawarded.is_empty());
    }

    #[test]
    fn no_tenders_means_no_closed_rows() {
        let report = run(&[notice("a", "UK6")]);
        assert!(report.closed_unawarded.is_empty());
        assert!(generate_closed_unawarded(
            &RecordSet::new(TENDER_SHEET),
            &RecordSet::new(AWARD_NOTICE_SHEET),
            &RecordSet::new(TERMINATION_SHEET),
            now()
        )
        .is_empty());
    }

    #[test]
    fn bucket_edges_are_right_inclusive() {
        let cells = [
            Cell::Int(0),
            Cell::Int(30),
            Cell::Int(31),
            Cell::Int(60),
            Cell::Int(61),
            Cell::Float(400.5),
            Cell::Int(-1),
            Cell::Text("".into()),
            Cell::Text("n/a".into()),
            Cell::Text("45".into()),
            Cell::Float(f64::NAN),
            Cell::Bool(true),
        ];
        let counts = bucketize(cells.iter());
        assert_eq!(counts, vec![("0-30", 1), ("31-60", 3), ("61+", 2)]);
        let total: usize = counts.iter().map(|(_, n)| n).sum();
        assert_eq!(total, 6);
    }

    #[test]
    fn zero_days_fall_outside_every_bucket() {
        assert_eq!(
            bucketize([Cell::Int(0), Cell::Float(0.0)].iter()),
            vec![("0-30", 0), ("31-60", 0), ("61+", 0)]
        );

        // Contract signed the same day the notice was published.
        let same_day = json!({
            "ocid": "s",
            "date": "2024-03-01T10:00:00Z",
            "awards": [{}],
            "contracts": [{"dateSigned": "2024-03-01T09:00:00Z", "documents": [{"noticeType": "UK7"}]}],
        });
        let report = run(&[same_day]);
        assert_eq!(report.award_notices.get(0, "Days to Award"), Some(&Cell::Int(0)));
        assert!(report.summary.iter().all(|r| r.award_count == 0));
    }

    #[test]
    fn summary_aligns_both_series_by_label() {
        let award = json!({
            "ocid": "w",
            "date": "2024-03-31T00:00:00Z",
            "awards": [{}],
            "contracts": [{"dateSigned": "2024-03-01T00:00:00Z", "documents": [{"noticeType": "UK7"}]}],
        });
        let report = run(&[
            award,
            uk4("ocds-abc-1", "2019-12-01T00:00:00Z", "2020-01-01T00:00:00+00:00", "Roads"),
        ]);
        assert_eq!(
            report.summary,
            vec![
                SummaryRow { range: "0-30".into(), award_count: 1, closed_unawarded_count: 0 },
                SummaryRow { range: "31-60".into(), award_count: 0, closed_unawarded_count: 1 },
                SummaryRow { range: "61+".into(), award_count: 0, closed_unawarded_count: 0 },
            ]
        );
    }

    #[test]
    fn organisation_filter_applies_before_classification() {
        let mut mine = uk4("a", "2019-12-01T00:00:00Z", "2020-01-01T00:00:00Z", "A");
        mine["buyer"] = json!({"id": "GB-PPON-1"});
        let mut theirs = uk4("b", "2019-12-01T00:00:00Z", "2020-01-01T00:00:00Z", "B");
        theirs["buyer"] = json!({"id": "GB-PPON-2"});
        let report = build_report(&[mine, theirs], now(), &OrgFilter::Buyer("GB-PPON-1".into()));
        assert_eq!(report.tenders.len(), 1);
        assert_eq!(report.tenders.get(0, "OCID"), Some(&Cell::Text("a".into())));
    }

    #[test]
    fn empty_batch_gives_empty_sheets_and_zero_summary() {
        let report = run(&[]);
        assert!(report.sheets().iter().all(|s| s.is_empty()));
        assert_eq!(report.summary.len(), 3);
        assert!(report.summary.iter().all(|r| r.award_count == 0 && r.closed_unawarded_count == 0));
    }
}
