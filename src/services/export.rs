use std::collections::{BTreeSet, HashSet};
use std::io::{Cursor, Write};

use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::error::{FestError, Result};
use crate::models::{AssignmentStatus, FestSnapshot, Participant, find_by_id};
use crate::services::qr;

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
    #[serde(default = "default_qr_module_px")]
    pub qr_module_px: u32,
    #[serde(default = "default_qr_quiet_zone")]
    pub qr_quiet_zone: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            sheet_name: default_sheet_name(),
            qr_module_px: default_qr_module_px(),
            qr_quiet_zone: default_qr_quiet_zone(),
        }
    }
}

const MAX_QR_MODULE_PX: u32 = 64;
const MAX_QR_QUIET_ZONE: u32 = 16;

impl ExportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sheet_name.trim().is_empty() {
            return Err(FestError::Config("sheet_name must not be empty".to_string()));
        }
        if !(1..=MAX_QR_MODULE_PX).contains(&self.qr_module_px) {
            return Err(FestError::Config(format!(
                "qr_module_px must be between 1 and {MAX_QR_MODULE_PX}, got {}",
                self.qr_module_px
            )));
        }
        if self.qr_quiet_zone > MAX_QR_QUIET_ZONE {
            return Err(FestError::Config(format!(
                "qr_quiet_zone must be at most {MAX_QR_QUIET_ZONE}, got {}",
                self.qr_quiet_zone
            )));
        }
        Ok(())
    }
}

fn default_sheet_name() -> String {
    "Participants".to_string()
}

fn default_qr_module_px() -> u32 {
    10
}

fn default_qr_quiet_zone() -> u32 {
    4
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRow {
    pub chest_number: u32,
    pub name: String,
    pub team: String,
    pub category: String,
    pub programs: Vec<String>,
}

const HEADERS: [&str; 5] = ["Chest No", "Name", "Team", "Category", "Programs"];

pub fn participant_rows(snapshot: &FestSnapshot) -> Vec<ParticipantRow> {
    let mut rows: Vec<ParticipantRow> = snapshot
        .participants
        .iter()
        .map(|participant| {
            let programs: BTreeSet<String> = snapshot
                .assignments
                .iter()
                .filter(|assignment| {
                    assignment.student_id == participant.id
                        && assignment.status == AssignmentStatus::Active
                })
                .map(|assignment| {
                    snapshot
                        .program(&assignment.program_id)
                        .map(|program| program.name.clone())
                        .unwrap_or_else(|| assignment.program_id.clone())
                })
                .collect();

            ParticipantRow {
                chest_number: participant.chest_number,
                name: participant.name.clone(),
                team: snapshot
                    .team(&participant.team_id)
                    .map(|team| team.name.clone())
                    .unwrap_or_else(|| participant.team_id.clone()),
                category: find_by_id(&snapshot.member_categories, &participant.category_id)
                    .map(|category| category.name.clone())
                    .unwrap_or_else(|| participant.category_id.clone()),
                programs: programs.into_iter().collect(),
            }
        })
        .collect();

    rows.sort_by_key(|row| row.chest_number);
    rows
}

pub fn write_xlsx(rows: &[ParticipantRow], sheet_name: &str) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    for (col, header) in HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
    }

    for (index, row) in rows.iter().enumerate() {
        let line = index as u32 + 1;
        worksheet.write_number(line, 0, f64::from(row.chest_number))?;
        worksheet.write_string(line, 1, row.name.as_str())?;
        worksheet.write_string(line, 2, row.team.as_str())?;
        worksheet.write_string(line, 3, row.category.as_str())?;
        worksheet.write_string(line, 4, row.programs.join(", "))?;
    }
    worksheet.set_column_width(1, 28.0)?;
    worksheet.set_column_width(2, 20.0)?;
    worksheet.set_column_width(4, 48.0)?;

    let bytes = workbook.save_to_buffer()?;
    info!("Exported {} participant rows to spreadsheet", rows.len());
    Ok(bytes)
}

pub struct ZipReport {
    pub archive: Vec<u8>,
    pub written: usize,
    /// Participant ids whose QR could not be produced, or whose file name was already taken
    pub skipped: Vec<String>,
}

pub fn qr_file_name(participant: &Participant) -> String {
    format!("{}.png", qr::qr_payload(participant))
}

pub fn write_qr_zip(participants: &[Participant], config: &ExportConfig) -> Result<ZipReport> {
    config.validate()?;
    let cursor = Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(cursor);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut written = 0usize;
    let mut skipped = Vec::new();
    let mut names = HashSet::new();
    for participant in participants {
        let file_name = qr_file_name(participant);
        if !names.insert(file_name.clone()) {
            warn!(
                "Skipping QR image for participant {}: {} is already in the archive",
                participant.id, file_name
            );
            skipped.push(participant.id.clone());
            continue;
        }

        let payload = qr::qr_payload(participant);
        let png = qr::encode_matrix(&payload)
            .and_then(|matrix| qr::render_png(&matrix, config.qr_module_px, config.qr_quiet_zone));
        match png {
            Ok(bytes) => {
                writer.start_file(file_name.as_str(), options)?;
                writer
                    .write_all(&bytes)
                    .map_err(|err| FestError::io(&file_name, err))?;
                written += 1;
            }
            Err(err) => {
                warn!("Skipping QR image for participant {}: {}", participant.id, err);
                skipped.push(participant.id.clone());
            }
        }
    }

    let archive = writer.finish()?.into_inner();
    info!(
        "QR archive ready: {} images, {} skipped",
        written,
        skipped.len()
    );
    Ok(ZipReport {
        archive,
        written,
        skipped,
    })
}
