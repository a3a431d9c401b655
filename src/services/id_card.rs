//! ID-card sheets: two cards per row, filled page by page in row-major order.
//!
//! Layout coordinates are millimetres measured from the top-left corner of the
//! page. PDF space starts bottom-left, the conversion happens only while drawing.

use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfLayerReference, Rect, Rgb as PdfRgb,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{FestError, Result};
use crate::models::{FestSnapshot, Participant};
use crate::services::qr::{self, QrMatrix};

pub const CARD_COLUMNS: usize = 2;

/// Colour with channels on the 0..=255 scale, kept fractional so gradient steps stay exact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self {
            r: f32::from(r),
            g: f32::from(g),
            b: f32::from(b),
        }
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(color: Rgb) -> Self {
        [
            color.r.round().clamp(0.0, 255.0) as u8,
            color.g.round().clamp(0.0, 255.0) as u8,
            color.b.round().clamp(0.0, 255.0) as u8,
        ]
    }
}

impl Rgb {
    fn to_pdf(self) -> Color {
        Color::Rgb(PdfRgb::new(self.r / 255.0, self.g / 255.0, self.b / 255.0, None))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageConfig {
    #[serde(default = "default_page_width")]
    pub page_width: f32,
    #[serde(default = "default_page_height")]
    pub page_height: f32,
    #[serde(default = "default_margin")]
    pub margin: f32,
    #[serde(default = "default_card_width")]
    pub card_width: f32,
    #[serde(default = "default_card_height")]
    pub card_height: f32,
    #[serde(default = "default_gradient_start")]
    pub gradient_start: Rgb,
    #[serde(default = "default_gradient_end")]
    pub gradient_end: Rgb,
    #[serde(default = "default_gradient_steps")]
    pub gradient_steps: u32,
    #[serde(default = "default_qr_size")]
    pub qr_size: f32,
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            page_width: default_page_width(),
            page_height: default_page_height(),
            margin: default_margin(),
            card_width: default_card_width(),
            card_height: default_card_height(),
            gradient_start: default_gradient_start(),
            gradient_end: default_gradient_end(),
            gradient_steps: default_gradient_steps(),
            qr_size: default_qr_size(),
            title: default_title(),
        }
    }
}

fn default_page_width() -> f32 {
    210.0
}

fn default_page_height() -> f32 {
    297.0
}

fn default_margin() -> f32 {
    5.0
}

// ISO/IEC 7810 ID-1
fn default_card_width() -> f32 {
    85.6
}

fn default_card_height() -> f32 {
    53.98
}

fn default_gradient_start() -> Rgb {
    Rgb::from([30, 64, 175])
}

fn default_gradient_end() -> Rgb {
    Rgb::from([124, 58, 237])
}

fn default_gradient_steps() -> u32 {
    100
}

fn default_qr_size() -> f32 {
    30.0
}

fn default_title() -> String {
    "Fest ID".to_string()
}

impl PageConfig {
    pub fn usable_height(&self) -> f32 {
        self.page_height - 2.0 * self.margin
    }

    pub fn cards_per_page(&self) -> usize {
        let rows = (self.usable_height() / self.card_height).floor();
        if rows.is_finite() && rows > 0.0 {
            rows as usize * CARD_COLUMNS
        } else {
            0
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.card_width <= 0.0 || self.card_height <= 0.0 {
            return Err(FestError::Config(format!(
                "card dimensions must be positive, got {}x{}",
                self.card_width, self.card_height
            )));
        }
        if self.gradient_steps == 0 {
            return Err(FestError::Config("gradient_steps must be at least 1".to_string()));
        }
        if self.cards_per_page() == 0 {
            return Err(FestError::Config(format!(
                "no card of height {} fits a page of height {} with margin {}",
                self.card_height, self.page_height, self.margin
            )));
        }

        let rows = self.cards_per_page() / CARD_COLUMNS;
        let bottom = self.margin + rows as f32 * (self.card_height + self.margin) - self.margin;
        let right = self.margin + CARD_COLUMNS as f32 * (self.card_width + self.margin) - self.margin;
        if bottom > self.page_height || right > self.page_width {
            warn!(
                "Card grid {:.2}x{:.2}mm overflows page {}x{}mm",
                right, bottom, self.page_width, self.page_height
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardPlacement {
    pub index: usize,
    pub page: usize,
    pub row: usize,
    pub col: usize,
    pub x: f32,
    pub y: f32,
}

pub fn placement(index: usize, cards_per_page: usize, config: &PageConfig) -> CardPlacement {
    let page = index / cards_per_page;
    let position = index % cards_per_page;
    let col = position % CARD_COLUMNS;
    let row = position / CARD_COLUMNS;
    CardPlacement {
        index,
        page,
        row,
        col,
        x: config.margin + col as f32 * (config.card_width + config.margin),
        y: config.margin + row as f32 * (config.card_height + config.margin),
    }
}

pub fn layout(participants: &[Participant], config: &PageConfig) -> Result<Vec<CardPlacement>> {
    config.validate()?;
    let cards_per_page = config.cards_per_page();
    Ok((0..participants.len())
        .map(|index| placement(index, cards_per_page, config))
        .collect())
}

pub fn gradient_color(start: Rgb, end: Rgb, step: u32, steps: u32) -> Rgb {
    let channel = |from: f32, to: f32| from + ((to - from) * step as f32) / steps as f32;
    Rgb {
        r: channel(start.r, end.r),
        g: channel(start.g, end.g),
        b: channel(start.b, end.b),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Strip {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: Rgb,
}

/// Vertical strips side by side across the card, approximating a left-to-right gradient.
pub fn gradient_strips(card: &CardPlacement, config: &PageConfig) -> Vec<Strip> {
    let steps = config.gradient_steps.max(1);
    let width = config.card_width / steps as f32;
    (0..steps)
        .map(|step| Strip {
            x: card.x + step as f32 * width,
            y: card.y,
            width,
            height: config.card_height,
            color: gradient_color(config.gradient_start, config.gradient_end, step, steps),
        })
        .collect()
}

pub struct CardBatch {
    pub pdf: Vec<u8>,
    pub pages: usize,
    pub cards: usize,
    /// Participant ids whose card was printed without a QR code
    pub skipped_qr: Vec<String>,
}

pub struct CardContent<'a> {
    pub participant: &'a Participant,
    pub team_name: &'a str,
}

pub fn card_contents<'a>(snapshot: &'a FestSnapshot) -> Vec<CardContent<'a>> {
    let mut participants: Vec<&Participant> = snapshot.participants.iter().collect();
    participants.sort_by_key(|participant| participant.chest_number);
    participants
        .into_iter()
        .map(|participant| CardContent {
            participant,
            team_name: snapshot
                .team(&participant.team_id)
                .map(|team| team.name.as_str())
                .unwrap_or(participant.team_id.as_str()),
        })
        .collect()
}

pub fn render(cards: &[CardContent<'_>], config: &PageConfig) -> Result<CardBatch> {
    render_with(cards, config, qr::encode_matrix)
}

pub fn render_with<F>(cards: &[CardContent<'_>], config: &PageConfig, encode: F) -> Result<CardBatch>
where
    F: Fn(&str) -> Result<QrMatrix>,
{
    config.validate()?;
    let cards_per_page = config.cards_per_page();
    let page_count = cards.len().div_ceil(cards_per_page).max(1);

    let (doc, first_page, first_layer) = PdfDocument::new(
        config.title.as_str(),
        Mm(config.page_width),
        Mm(config.page_height),
        "Cards",
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|err| FestError::Pdf(err.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|err| FestError::Pdf(err.to_string()))?;
    let fonts = Fonts { regular, bold };

    let mut layers = vec![doc.get_page(first_page).get_layer(first_layer)];
    for page in 1..page_count {
        let (page_index, layer_index) = doc.add_page(
            Mm(config.page_width),
            Mm(config.page_height),
            format!("Cards {}", page + 1),
        );
        layers.push(doc.get_page(page_index).get_layer(layer_index));
    }

    let mut skipped_qr = Vec::new();
    for (index, card) in cards.iter().enumerate() {
        let slot = placement(index, cards_per_page, config);
        let layer = &layers[slot.page];
        draw_card_face(layer, &fonts, card, &slot, config);

        let payload = qr::qr_payload(card.participant);
        match encode(&payload) {
            Ok(matrix) => draw_qr(layer, &matrix, &slot, config),
            Err(err) => {
                warn!(
                    "Skipping QR for participant {} (chest {}): {}",
                    card.participant.id, payload, err
                );
                skipped_qr.push(card.participant.id.clone());
            }
        }
    }

    let pdf = doc
        .save_to_bytes()
        .map_err(|err| FestError::Pdf(err.to_string()))?;
    info!(
        "Rendered {} ID cards on {} pages ({} without QR)",
        cards.len(),
        page_count,
        skipped_qr.len()
    );

    Ok(CardBatch {
        pdf,
        pages: page_count,
        cards: cards.len(),
        skipped_qr,
    })
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn fill_rect(layer: &PdfLayerReference, config: &PageConfig, x: f32, y: f32, width: f32, height: f32) {
    let bottom = config.page_height - y - height;
    layer.add_rect(Rect::new(
        Mm(x),
        Mm(bottom),
        Mm(x + width),
        Mm(bottom + height),
    ));
}

fn draw_text(
    layer: &PdfLayerReference,
    config: &PageConfig,
    font: &IndirectFontRef,
    text: &str,
    size: f32,
    x: f32,
    baseline_from_top: f32,
) {
    layer.use_text(
        text,
        size,
        Mm(x),
        Mm(config.page_height - baseline_from_top),
        font,
    );
}

fn draw_card_face(
    layer: &PdfLayerReference,
    fonts: &Fonts,
    card: &CardContent<'_>,
    slot: &CardPlacement,
    config: &PageConfig,
) {
    for strip in gradient_strips(slot, config) {
        layer.set_fill_color(strip.color.to_pdf());
        fill_rect(layer, config, strip.x, strip.y, strip.width, strip.height);
    }

    let left = slot.x + 4.0;
    layer.set_fill_color(Rgb::from([255, 255, 255]).to_pdf());
    draw_text(layer, config, &fonts.regular, &config.title, 9.0, left, slot.y + 8.0);
    draw_text(
        layer,
        config,
        &fonts.bold,
        &card.participant.name,
        12.0,
        left,
        slot.y + 20.0,
    );
    draw_text(layer, config, &fonts.regular, card.team_name, 9.0, left, slot.y + 27.0);
    draw_text(
        layer,
        config,
        &fonts.bold,
        &card.participant.chest_number.to_string(),
        22.0,
        left,
        slot.y + config.card_height - 8.0,
    );
}

fn draw_qr(layer: &PdfLayerReference, matrix: &QrMatrix, slot: &CardPlacement, config: &PageConfig) {
    let size = config.qr_size.min(config.card_height - 8.0).max(1.0);
    let x = slot.x + config.card_width - size - 4.0;
    let y = slot.y + (config.card_height - size) / 2.0;

    // Light backing square with a one-module quiet zone.
    let module = size / (matrix.width() + 2) as f32;
    layer.set_fill_color(Rgb::from([255, 255, 255]).to_pdf());
    fill_rect(layer, config, x, y, size, size);

    layer.set_fill_color(Rgb::from([0, 0, 0]).to_pdf());
    for (mx, my) in matrix.dark_modules() {
        fill_rect(
            layer,
            config,
            x + (mx + 1) as f32 * module,
            y + (my + 1) as f32 * module,
            module,
            module,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participants(count: usize) -> Vec<Participant> {
        (0..count)
            .map(|i| Participant {
                id: format!("s{i}"),
                name: format!("Student {i}"),
                team_id: "t1".to_string(),
                category_id: "junior".to_string(),
                chest_number: 100 + i as u32,
            })
            .collect()
    }

    fn eight_per_page() -> PageConfig {
        PageConfig {
            page_height: 240.0,
            margin: 10.0,
            ..PageConfig::default()
        }
    }

    #[test]
    fn default_page_fits_five_rows() {
        let config = PageConfig::default();
        assert_eq!(config.cards_per_page(), 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn eight_cards_fill_first_page_row_major() {
        let config = eight_per_page();
        assert_eq!(config.cards_per_page(), 8);

        let placements = layout(&participants(9), &config).expect("layout");
        let grid: Vec<(usize, usize, usize)> = placements
            .iter()
            .map(|p| (p.page, p.row, p.col))
            .collect();
        assert_eq!(
            grid,
            vec![
                (0, 0, 0),
                (0, 0, 1),
                (0, 1, 0),
                (0, 1, 1),
                (0, 2, 0),
                (0, 2, 1),
                (0, 3, 0),
                (0, 3, 1),
                (1, 0, 0),
            ]
        );

        assert_eq!(placements[8].x, config.margin);
        assert_eq!(placements[8].y, config.margin);
        assert_eq!(placements[3].x, 10.0 + (85.6 + 10.0));
        assert_eq!(placements[3].y, 10.0 + (53.98 + 10.0));
    }

    #[test]
    fn card_taller_than_page_is_rejected() {
        let config = PageConfig {
            page_height: 50.0,
            ..PageConfig::default()
        };
        assert!(matches!(layout(&participants(1), &config), Err(FestError::Config(_))));
    }

    #[test]
    fn gradient_hits_both_stops_exactly() {
        let start = Rgb::from([30, 64, 175]);
        let end = Rgb::from([124, 58, 237]);
        assert_eq!(gradient_color(start, end, 0, 100), start);
        assert_eq!(gradient_color(start, end, 100, 100), end);
        assert_eq!(gradient_color(start, end, 7, 7), end);

        let middle = gradient_color(Rgb::from([0, 0, 0]), Rgb::from([200, 100, 50]), 1, 2);
        assert_eq!(middle, Rgb { r: 100.0, g: 50.0, b: 25.0 });
    }

    #[test]
    fn strips_cover_the_card_width() {
        let config = PageConfig::default();
        let card = placement(1, config.cards_per_page(), &config);
        let strips = gradient_strips(&card, &config);
        assert_eq!(strips.len(), 100);
        assert_eq!(strips[0].x, card.x);
        assert_eq!(strips[0].color, config.gradient_start);
        let last = strips[strips.len() - 1];
        assert!((last.x + last.width - (card.x + config.card_width)).abs() < 1e-3);
    }

    #[test]
    fn failed_qr_skips_only_that_participant() {
        let people = participants(11);
        let cards: Vec<CardContent<'_>> = people
            .iter()
            .map(|participant| CardContent {
                participant,
                team_name: "Red House",
            })
            .collect();

        let batch = render_with(&cards, &PageConfig::default(), |payload| {
            if payload == "103" {
                Err(FestError::Qr {
                    payload: payload.to_string(),
                    message: "encoder unavailable".to_string(),
                })
            } else {
                qr::encode_matrix(payload)
            }
        })
        .expect("batch should render despite one QR failure");

        assert!(batch.pdf.starts_with(b"%PDF"));
        assert_eq!(batch.cards, 11);
        assert_eq!(batch.pages, 2);
        assert_eq!(batch.skipped_qr, vec!["s3".to_string()]);
    }
}
