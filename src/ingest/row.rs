//! Validated rows of an uploaded payment sheet.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use super::parse::{parse_duration, parse_payout};
use crate::date_util::{local_date, local_midnight};
use crate::error::{Error, Result};

pub const COL_WORK_DATE: &str = "workDate";
pub const COL_ITEM_ID: &str = "itemID";
pub const COL_PAY_TYPE: &str = "payType";
pub const COL_DURATION: &str = "duration";
pub const COL_PAYOUT: &str = "payout";
pub const COL_PROJECT_NAME: &str = "projectName";
pub const COL_STATUS: &str = "status";

/// How a row's pay type is turned into tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayType {
    /// Base pay for a work item; merged per item and day.
    Prepay,
    /// `overtime` or `overtimepay`; merged with the base pay.
    Overtime,
    /// Tracked working time (`hubstaffoperation`); standalone with hours.
    WorkedTime,
    /// Anything else (rewards, adjustments); standalone, amount only.
    Other(String),
}

impl PayType {
    pub fn classify(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "prepay" => PayType::Prepay,
            "overtime" | "overtimepay" => PayType::Overtime,
            "hubstaffoperation" => PayType::WorkedTime,
            other => PayType::Other(other.to_string()),
        }
    }

    pub fn is_groupable(&self) -> bool {
        matches!(self, PayType::Prepay | PayType::Overtime)
    }
}

/// A row that was skipped, with its 1-based line in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub line: u64,
    pub message: String,
}

/// A data row with every required field present and parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    pub line: u64,
    pub work_date: DateTime<Utc>,
    /// Civil date of `work_date` in the importing user's timezone.
    pub local_date: NaiveDate,
    pub item_id: String,
    /// Pay type as written in the file.
    pub pay_type_label: String,
    pub pay_type: PayType,
    pub duration_hours: f64,
    pub payout: f64,
    pub project_name: String,
    pub status: String,
}

/// A parsed sheet: header index plus raw records, fully buffered.
#[derive(Debug)]
pub struct CsvSheet {
    columns: HashMap<String, usize>,
    records: Vec<csv::StringRecord>,
}

impl CsvSheet {
    /// Read `data` with a header row. Fails when the text is not CSV or has
    /// no data rows.
    pub fn parse(data: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(data.as_bytes());

        let columns = reader
            .headers()?
            .iter()
            .enumerate()
            .filter(|(_, name)| !name.is_empty())
            .map(|(i, name)| (name.trim_start_matches('\u{feff}').to_lowercase(), i))
            .collect::<HashMap<_, _>>();

        let mut records = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            records.push(record);
        }
        if records.is_empty() {
            return Err(Error::Validation("CSV file contains no data rows".into()));
        }
        Ok(Self { columns, records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fail unless every named column is present (case-insensitive).
    pub fn require_columns(&self, names: &[&str]) -> Result<()> {
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|n| !self.columns.contains_key(&n.to_lowercase()))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "CSV is missing required column(s): {}",
                missing.join(", ")
            )))
        }
    }

    fn cell<'r>(&self, record: &'r csv::StringRecord, name: &str) -> &'r str {
        self.columns
            .get(&name.to_lowercase())
            .and_then(|&i| record.get(i))
            .unwrap_or("")
    }

    /// Validate every record. Rows missing a required value or carrying an
    /// unreadable `workDate` come back as errors instead.
    pub fn rows(&self, tz: Tz) -> (Vec<CsvRow>, Vec<RowError>) {
        let mut rows = Vec::with_capacity(self.records.len());
        let mut errors = Vec::new();
        for record in &self.records {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            match self.row(record, line, tz) {
                Ok(row) => rows.push(row),
                Err(message) => errors.push(RowError { line, message }),
            }
        }
        (rows, errors)
    }

    fn row(
        &self,
        record: &csv::StringRecord,
        line: u64,
        tz: Tz,
    ) -> std::result::Result<CsvRow, String> {
        let required = |name: &str| -> std::result::Result<String, String> {
            let v = self.cell(record, name);
            if v.is_empty() {
                Err(format!("missing {name}"))
            } else {
                Ok(v.to_string())
            }
        };
        let raw_date = required(COL_WORK_DATE)?;
        let item_id = required(COL_ITEM_ID)?;
        let pay_type_label = required(COL_PAY_TYPE)?;

        let work_date = parse_work_date(&raw_date, tz)
            .ok_or_else(|| format!("unreadable {COL_WORK_DATE} '{raw_date}'"))?;

        Ok(CsvRow {
            line,
            work_date,
            local_date: local_date(work_date, tz),
            item_id,
            pay_type: PayType::classify(&pay_type_label),
            pay_type_label,
            duration_hours: parse_duration(self.cell(record, COL_DURATION)),
            payout: parse_payout(self.cell(record, COL_PAYOUT)),
            project_name: self.cell(record, COL_PROJECT_NAME).to_string(),
            status: self.cell(record, COL_STATUS).to_string(),
        })
    }

    /// Distinct non-empty `itemID` values in file order.
    pub fn item_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .map(|r| self.cell(r, COL_ITEM_ID))
            .filter(|id| !id.is_empty())
            .filter(|id| seen.insert(id.to_string()))
            .map(String::from)
            .collect()
    }
}

/// Accepts RFC3339, `YYYY-MM-DD[ HH:MM:SS]` and `MM/DD/YYYY`. Values
/// without an offset are read in `tz`; bare dates land on local midnight.
pub fn parse_work_date(s: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }
    ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .map(|d| local_midnight(d, tz))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_util::to_db_timestamp;

    const SHEET: &str = "\
workDate,itemID,duration,rateApplied,payout,payType,projectName,status
2024-01-01,X1,1h,$10.00/hr,$10.00,prepay,Alpha,approved
01/02/2024,X2,-,-,\"$1,000.00\",missionReward,Beta,paid
,X3,1h,,$1,prepay,Alpha,approved
2024-13-45,X4,1h,,$1,prepay,Alpha,approved
2024-01-03T10:00:00Z,X1,15m,,$2.50,HubstaffOperation,Gamma,
";

    #[test]
    fn test_pay_type_classification() {
        assert_eq!(PayType::classify("prepay"), PayType::Prepay);
        assert_eq!(PayType::classify(" OvertimePay "), PayType::Overtime);
        assert_eq!(PayType::classify("overtime"), PayType::Overtime);
        assert_eq!(PayType::classify("hubstaffOperation"), PayType::WorkedTime);
        assert_eq!(
            PayType::classify("payAdjustment"),
            PayType::Other("payadjustment".into())
        );
        assert!(PayType::Prepay.is_groupable());
        assert!(!PayType::WorkedTime.is_groupable());
    }

    #[test]
    fn test_rows_and_skips() {
        let sheet = CsvSheet::parse(SHEET).unwrap();
        assert_eq!(sheet.len(), 5);
        sheet
            .require_columns(&[COL_WORK_DATE, COL_ITEM_ID, COL_PAY_TYPE])
            .unwrap();

        let (rows, errors) = sheet.rows(chrono_tz::UTC);
        assert_eq!(rows.len(), 3);
        assert_eq!(
            errors.iter().map(|e| e.line).collect::<Vec<_>>(),
            vec![4, 5]
        );
        assert!(errors[0].message.contains("workDate"));

        assert_eq!(rows[0].duration_hours, 1.0);
        assert_eq!(rows[0].payout, 10.0);
        assert_eq!(rows[1].payout, 1000.0);
        assert_eq!(rows[1].local_date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(rows[2].pay_type, PayType::WorkedTime);
        assert_eq!(rows[2].pay_type_label, "HubstaffOperation");
        assert_eq!(rows[2].status, "");
    }

    #[test]
    fn test_missing_columns() {
        let sheet = CsvSheet::parse("itemID,payout\nX1,$1\n").unwrap();
        let err = sheet
            .require_columns(&[COL_WORK_DATE, COL_ITEM_ID, COL_PAY_TYPE])
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("workDate, payType"));
        assert!(sheet.require_columns(&[COL_ITEM_ID]).is_ok());
    }

    #[test]
    fn test_empty_sheet_is_fatal() {
        assert!(matches!(
            CsvSheet::parse("workDate,itemID,payType\n"),
            Err(Error::Validation(_))
        ));
        assert!(CsvSheet::parse("").is_err());
    }

    #[test]
    fn test_item_ids_are_unique_in_order() {
        let sheet = CsvSheet::parse(SHEET).unwrap();
        assert_eq!(sheet.item_ids(), vec!["X1", "X2", "X3", "X4"]);
    }

    #[test]
    fn test_parse_work_date_formats() {
        let tz = chrono_tz::America::New_York;
        let iso = parse_work_date("2024-03-09", tz).unwrap();
        assert_eq!(to_db_timestamp(iso), "2024-03-09T05:00:00.000Z");
        assert_eq!(parse_work_date("03/09/2024", tz), Some(iso));
        assert_eq!(
            to_db_timestamp(parse_work_date("2024-03-10T04:30:00Z", tz).unwrap()),
            "2024-03-10T04:30:00.000Z"
        );
        assert_eq!(
            to_db_timestamp(parse_work_date("2024-07-01 09:00:00", tz).unwrap()),
            "2024-07-01T13:00:00.000Z"
        );
        assert_eq!(parse_work_date("last tuesday", tz), None);
    }
}
