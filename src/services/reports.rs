//! Reporting service and roster CSV rendering

use chrono::{NaiveDate, Utc};

use crate::{
    error::{AppError, AppResult},
    models::{
        reader::RosterRow,
        report::{LibraryOverview, ReaderIssueCount, StaffIssueCount, TOP_LIMIT},
    },
    repository::Repository,
};

/// Header line of the roster export
pub const ROSTER_CSV_HEADER: [&str; 7] = [
    "Номер билета",
    "ФИО",
    "Адрес",
    "Телефон",
    "Дата регистрации",
    "Книг на руках",
    "Всего книг взято",
];

pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// `readers_<yyyy-mm-dd>.csv`
pub fn export_filename(date: NaiveDate) -> String {
    format!("readers_{}.csv", date.format("%Y-%m-%d"))
}

/// Render roster rows as UTF-8 CSV: `;` delimited, `\n` terminated, one
/// header line followed by one line per reader in the given order
pub fn render_roster_csv(rows: &[RosterRow]) -> AppResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let csv_error = |e: csv::Error| AppError::Internal(format!("Failed to write CSV: {}", e));

    writer.write_record(ROSTER_CSV_HEADER).map_err(csv_error)?;
    for row in rows {
        let registered = row.created_at.format("%d.%m.%Y").to_string();
        let active = row.active_issues.to_string();
        let total = row.total_issues.to_string();
        writer
            .write_record([
                row.card_number.as_str(),
                row.name.as_str(),
                row.address.as_deref().unwrap_or(""),
                row.phone.as_deref().unwrap_or(""),
                registered.as_str(),
                active.as_str(),
                total.as_str(),
            ])
            .map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to flush CSV: {}", e)))
}

#[derive(Clone)]
pub struct ReportsService {
    repository: Repository,
}

impl ReportsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn overview(&self) -> AppResult<LibraryOverview> {
        self.repository.reports.overview(Utc::now()).await
    }

    pub async fn top_readers(&self) -> AppResult<Vec<ReaderIssueCount>> {
        self.repository.reports.top_readers(TOP_LIMIT).await
    }

    pub async fn staff_activity(&self) -> AppResult<Vec<StaffIssueCount>> {
        self.repository.reports.issues_by_staff().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(card: &str, name: &str) -> RosterRow {
        RosterRow {
            card_number: card.to_string(),
            name: name.to_string(),
            address: Some("пр. Мира; кв. 5".to_string()),
            phone: None,
            created_at: Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap(),
            active_issues: 1,
            total_issues: 3,
        }
    }

    #[test]
    fn test_header_and_terminator() {
        let csv = render_roster_csv(&[]).unwrap();
        assert_eq!(
            String::from_utf8(csv).unwrap(),
            "Номер билета;ФИО;Адрес;Телефон;Дата регистрации;Книг на руках;Всего книг взято\n"
        );
    }

    #[test]
    fn test_delimiter_inside_field_is_quoted() {
        let csv = String::from_utf8(render_roster_csv(&[row("ЧБ-00003", "Сидоров")]).unwrap()).unwrap();
        assert!(!csv.starts_with('\u{feff}'));
        assert!(!csv.contains('\r'));
        assert_eq!(
            csv.lines().nth(1),
            Some("ЧБ-00003;Сидоров;\"пр. Мира; кв. 5\";;31.12.2023;1;3")
        );
    }

    #[test]
    fn test_export_filename() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 9).unwrap();
        assert_eq!(export_filename(date), "readers_2024-02-09.csv");
    }
}
