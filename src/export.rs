use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Color, Workbook, XlsxError};

use crate::db::model::sample::Sample;

pub const XLSX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub const DEFAULT_COLUMNS: [&str; 9] = [
    "sample_id",
    "name",
    "sample_type",
    "status",
    "quantity",
    "storage_location",
    "viability",
    "collection_date",
    "expiration_date",
];

const HEADER_COLOR: Color = Color::RGB(0x4472C4);
const COLUMN_WIDTH: f64 = 18.0;

/// Header label for a column key. Unknown keys fall through as their own
/// label so a stray key yields an empty column instead of an error.
fn column_label(key: &str) -> &str {
    match key {
        "sample_id" => "Sample ID",
        "name" => "Sample Name",
        "sample_type" => "Sample Type",
        "description" => "Description",
        "source" => "Source",
        "donor_info" => "Donor Information",
        "storage_location" => "Storage Location",
        "status" => "Status",
        "quantity" => "Quantity (vials)",
        "passage_number" => "Passage Number",
        "collection_date" => "Collection Date",
        "storage_date" => "Storage Date",
        "expiration_date" => "Expiration Date",
        "viability" => "Viability (%)",
        "quality_control_notes" => "Quality Control Notes",
        "research_use_only" => "Research Use Only",
        "created_by" => "Created By",
        "created_at" => "Created At",
        "updated_at" => "Updated At",
        _ => key,
    }
}

fn yes_no(value: bool) -> String {
    if value { "Yes" } else { "No" }.to_string()
}

fn date(value: chrono::NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn cell_value(sample: &Sample, key: &str) -> String {
    match key {
        "sample_id" => sample.sample_id.clone(),
        "name" => sample.name.clone(),
        "sample_type" => sample.sample_type.label().to_string(),
        "description" => sample.description.clone(),
        "source" => sample.source.clone(),
        "donor_info" => sample.donor_info.clone(),
        "storage_location" => sample.storage_location.clone(),
        "status" => sample.status.label().to_string(),
        "quantity" => sample.quantity.to_string(),
        "passage_number" => sample
            .passage_number
            .map(|n| n.to_string())
            .unwrap_or_default(),
        "collection_date" => sample.collection_date.map(date).unwrap_or_default(),
        "storage_date" => date(sample.storage_date),
        "expiration_date" => sample.expiration_date.map(date).unwrap_or_default(),
        "viability" => sample.viability.map(|v| v.to_string()).unwrap_or_default(),
        "quality_control_notes" => sample.quality_control_notes.clone(),
        "research_use_only" => yes_no(sample.research_use_only),
        "created_by" => sample
            .created_by
            .as_ref()
            .map(|person| person.name.clone())
            .unwrap_or_default(),
        "created_at" => timestamp(sample.created_at),
        "updated_at" => timestamp(sample.updated_at),
        _ => String::new(),
    }
}

pub fn write_workbook(samples: &[Sample], columns: &[String]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Samples")?;

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(HEADER_COLOR)
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin);
    let cell_format = Format::new().set_border(FormatBorder::Thin);

    for (col, key) in columns.iter().enumerate() {
        let col = u16::try_from(col).unwrap_or(u16::MAX);
        worksheet.write_string_with_format(0, col, column_label(key), &header_format)?;
        worksheet.set_column_width(col, COLUMN_WIDTH)?;
    }

    for (row, sample) in samples.iter().enumerate() {
        let row = u32::try_from(row).unwrap_or(u32::MAX - 1) + 1;
        for (col, key) in columns.iter().enumerate() {
            let col = u16::try_from(col).unwrap_or(u16::MAX);
            worksheet.write_string_with_format(row, col, cell_value(sample, key), &cell_format)?;
        }
    }

    workbook.save_to_buffer()
}

pub fn export_filename(at: DateTime<Utc>) -> String {
    format!("samples_export_{}.xlsx", at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use uuid::Uuid;

    use super::*;
    use crate::db::model::{
        person::PersonHandle,
        sample::{SampleStatus, SampleType},
    };

    fn sample() -> Sample {
        Sample {
            id: Uuid::now_v7(),
            sample_id: "IPSC-2024-001".to_string(),
            name: "Human iPSC Line - Patient A".to_string(),
            sample_type: SampleType::Ipsc,
            description: "Derived from adult fibroblasts".to_string(),
            source: "Stanford Stem Cell Institute".to_string(),
            donor_info: String::new(),
            storage_location: "Freezer A, Rack 1, Box 5".to_string(),
            status: SampleStatus::InUse,
            quantity: 10.0,
            passage_number: Some(15),
            collection_date: NaiveDate::from_ymd_opt(2024, 2, 29),
            storage_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            expiration_date: None,
            viability: Some(95.5),
            quality_control_notes: "Karyotype normal".to_string(),
            research_use_only: true,
            image_path: None,
            created_by: Some(PersonHandle {
                id: Uuid::now_v7(),
                name: "Site Admin".to_string(),
            }),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap(),
        }
    }

    #[rstest]
    #[case("sample_id", "Sample ID")]
    #[case("quantity", "Quantity (vials)")]
    #[case("viability", "Viability (%)")]
    #[case("donor_info", "Donor Information")]
    #[case("created_by", "Created By")]
    #[case("mystery_column", "mystery_column")]
    fn labels(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(column_label(key), expected);
    }

    #[rstest]
    #[case("sample_type", "Induced Pluripotent Stem Cell")]
    #[case("status", "In Use")]
    #[case("research_use_only", "Yes")]
    #[case("collection_date", "2024-02-29")]
    #[case("expiration_date", "")]
    #[case("created_at", "2024-03-01T09:30:00")]
    #[case("created_by", "Site Admin")]
    #[case("quantity", "10")]
    #[case("viability", "95.5")]
    #[case("mystery_column", "")]
    fn cell_rendering(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(cell_value(&sample(), key), expected);
    }

    #[test]
    fn default_columns_are_all_known() {
        for key in DEFAULT_COLUMNS {
            assert!(column_label(key) != key);
        }
    }

    #[test]
    fn workbook_is_a_zip_archive() {
        let columns: Vec<_> = DEFAULT_COLUMNS.iter().map(ToString::to_string).collect();
        let bytes = write_workbook(&[sample()], &columns).unwrap();

        // xlsx is a zip container
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn empty_result_set_still_produces_a_workbook() {
        let bytes = write_workbook(&[], &["sample_id".to_string()]).unwrap();

        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn filename_embeds_the_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 5).unwrap();

        assert_eq!(export_filename(at), "samples_export_20240301_093005.xlsx");
    }
}
