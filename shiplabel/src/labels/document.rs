//! Streaming PDF composition.
//!
//! A label is a single A4 page. Each indirect object is serialized into its own [`Chunk`] and
//! pushed down the response channel as soon as it is built, with its byte offset recorded. The
//! cross-reference table and trailer go out last, so only one object is ever buffered.

use std::io;

use bytes::Bytes;
use image::ImageFormat;
use miniz_oxide::deflate::compress_to_vec_zlib;
use pdf_writer::{Chunk, Content, Filter, Name, Rect, Ref, Str, writers::Catalog};
use thiserror::Error as ThisError;
use tokio::sync::mpsc;
use tracing::trace;

use super::fonts::{Face, encode_win_ansi};

pub const RENDER_FAILED_PLACEHOLDER: &str = "Error generating barcode";
pub const MISSING_BARCODE_PLACEHOLDER: &str = "Barcode not available";

/// Sending half of a streamed response body.
pub type BodySender = mpsc::Sender<Result<Bytes, io::Error>>;

#[derive(ThisError, Debug)]
pub enum StreamError {
    #[error("client went away after {sent} bytes")]
    ClientGone { sent: usize },

    #[error("document generation exceeded its deadline")]
    TimedOut,
}

/// A decoded barcode ready to be embedded as an 8-bit grayscale image.
#[derive(Debug, Clone)]
pub struct BarcodeImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl BarcodeImage {
    pub fn from_png(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.into_luma8();
        Ok(Self {
            width: img.width(),
            height: img.height(),
            pixels: img.into_raw(),
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// What goes in the barcode box.
#[derive(Debug, Clone)]
pub enum BarcodeSlot {
    Image(BarcodeImage),
    Placeholder(&'static str),
}

#[derive(Debug, Clone)]
pub struct Party {
    pub name: String,
    pub address: String,
}

/// Everything printed on one label.
#[derive(Debug, Clone)]
pub struct LabelSheet {
    pub title: String,
    pub sender: Party,
    pub receiver: Party,
    pub identifier: String,
    pub barcode: BarcodeSlot,
}

const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
const MARGIN: f32 = 56.0;
const BARCODE_BOX_WIDTH: f32 = 420.0;
const BARCODE_BOX_HEIGHT: f32 = 120.0;

const CATALOG_ID: Ref = Ref::new(1);
const PAGE_TREE_ID: Ref = Ref::new(2);
const PAGE_ID: Ref = Ref::new(3);
const REGULAR_FONT_ID: Ref = Ref::new(4);
const BOLD_FONT_ID: Ref = Ref::new(5);
const CONTENT_ID: Ref = Ref::new(6);
const IMAGE_ID: Ref = Ref::new(7);

const IMAGE_NAME: Name<'static> = Name(b"Im1");

fn font_name(face: Face) -> Name<'static> {
    match face {
        Face::Regular => Name(b"F1"),
        Face::Bold => Name(b"F2"),
    }
}

/// Writes PDF bytes into the body channel while tracking object offsets.
struct PdfStream<'a> {
    tx: &'a BodySender,
    written: usize,
    offsets: Vec<usize>,
}

impl<'a> PdfStream<'a> {
    fn new(tx: &'a BodySender) -> Self {
        Self {
            tx,
            written: 0,
            offsets: Vec::new(),
        }
    }

    async fn send(&mut self, bytes: Vec<u8>) -> Result<(), StreamError> {
        let len = bytes.len();
        self.tx
            .send(Ok(Bytes::from(bytes)))
            .await
            .map_err(|_| StreamError::ClientGone { sent: self.written })?;
        self.written += len;
        Ok(())
    }

    async fn header(&mut self) -> Result<(), StreamError> {
        // The binary comment marks the file as 8-bit for transfer tools
        self.send(b"%PDF-1.7\n%\x80\x80\x80\x80\n\n".to_vec()).await
    }

    /// Send a chunk holding exactly the object `id`. Objects must arrive in id order.
    async fn object(&mut self, id: Ref, chunk: Chunk) -> Result<(), StreamError> {
        debug_assert_eq!(id.get() as usize, self.offsets.len() + 1);
        self.offsets.push(self.written);
        trace!(object = id.get(), offset = self.written, len = chunk.len(), "Streaming PDF object");
        self.send(chunk.as_bytes().to_vec()).await
    }

    /// Emit the cross-reference table and trailer. Returns the total document size.
    async fn finish(mut self) -> Result<usize, StreamError> {
        let xref_offset = self.written;
        let size = self.offsets.len() + 1;

        let mut tail = format!("xref\n0 {size}\n0000000000 65535 f\r\n");
        for offset in &self.offsets {
            tail.push_str(&format!("{offset:010} 00000 n\r\n"));
        }
        tail.push_str(&format!(
            "trailer\n<< /Size {size} /Root {} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
            CATALOG_ID.get()
        ));

        self.send(tail.into_bytes()).await?;
        Ok(self.written)
    }
}

fn show_text(content: &mut Content, face: Face, size: f32, x: f32, y: f32, text: &str) {
    let encoded = encode_win_ansi(text);
    content.begin_text();
    content.set_font(font_name(face), size);
    content.next_line(x, y);
    content.show(Str(&encoded));
    content.end_text();
}

fn show_centered(content: &mut Content, face: Face, size: f32, y: f32, text: &str) {
    let x = (PAGE_WIDTH - face.text_width(text, size)) / 2.0;
    show_text(content, face, size, x.max(MARGIN), y, text);
}

/// Lay out a "From:"/"To:" block starting at `y`, returning the baseline below it.
fn party_block(content: &mut Content, heading: &str, party: &Party, mut y: f32) -> f32 {
    show_text(content, Face::Bold, 12.0, MARGIN, y, heading);
    y -= 18.0;
    show_text(content, Face::Regular, 12.0, MARGIN, y, &party.name);
    for line in party.address.lines() {
        y -= 15.0;
        show_text(content, Face::Regular, 11.0, MARGIN, y, line);
    }
    y - 30.0
}

/// Build the page content stream.
fn page_content(sheet: &LabelSheet) -> Vec<u8> {
    let mut content = Content::new();
    let mut y = PAGE_HEIGHT - MARGIN - 20.0;

    show_centered(&mut content, Face::Bold, 20.0, y, &sheet.title);
    y -= 50.0;

    y = party_block(&mut content, "From:", &sheet.sender, y);
    y = party_block(&mut content, "To:", &sheet.receiver, y);

    show_text(
        &mut content,
        Face::Bold,
        12.0,
        MARGIN,
        y,
        &format!("Delivery ID: {}", sheet.identifier),
    );
    y -= 30.0;

    let box_left = (PAGE_WIDTH - BARCODE_BOX_WIDTH) / 2.0;
    let box_bottom = y - BARCODE_BOX_HEIGHT;

    match &sheet.barcode {
        BarcodeSlot::Image(image) => {
            let (width, height) = image.dimensions();
            let scale = (BARCODE_BOX_WIDTH / width as f32).min(BARCODE_BOX_HEIGHT / height as f32);
            let (draw_width, draw_height) = (width as f32 * scale, height as f32 * scale);
            let x = (PAGE_WIDTH - draw_width) / 2.0;
            let y0 = box_bottom + (BARCODE_BOX_HEIGHT - draw_height) / 2.0;

            content.save_state();
            content.transform([draw_width, 0.0, 0.0, draw_height, x, y0]);
            content.x_object(IMAGE_NAME);
            content.restore_state();

            show_centered(&mut content, Face::Regular, 10.0, box_bottom - 16.0, &sheet.identifier);
        }
        BarcodeSlot::Placeholder(message) => {
            content.set_line_width(0.5);
            content.rect(box_left, box_bottom, BARCODE_BOX_WIDTH, BARCODE_BOX_HEIGHT);
            content.stroke();
            show_centered(
                &mut content,
                Face::Regular,
                14.0,
                box_bottom + BARCODE_BOX_HEIGHT / 2.0 - 5.0,
                message,
            );
        }
    }

    content.finish()
}

/// Stream the label as a PDF into `tx`.
///
/// Returns the number of bytes sent. Fails with [`StreamError::ClientGone`] as soon as the
/// receiving end has been dropped; nothing further is written after that.
pub async fn stream_label(sheet: &LabelSheet, tx: &BodySender) -> Result<usize, StreamError> {
    let image = match &sheet.barcode {
        BarcodeSlot::Image(image) => Some(image),
        BarcodeSlot::Placeholder(_) => None,
    };

    let mut out = PdfStream::new(tx);
    out.header().await?;

    let mut chunk = Chunk::new();
    chunk.indirect(CATALOG_ID).start::<Catalog>().pages(PAGE_TREE_ID);
    out.object(CATALOG_ID, chunk).await?;

    let mut chunk = Chunk::new();
    chunk.pages(PAGE_TREE_ID).kids([PAGE_ID]).count(1);
    out.object(PAGE_TREE_ID, chunk).await?;

    let mut chunk = Chunk::new();
    {
        let mut page = chunk.page(PAGE_ID);
        page.parent(PAGE_TREE_ID);
        page.media_box(Rect::new(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT));
        page.contents(CONTENT_ID);
        let mut resources = page.resources();
        resources
            .fonts()
            .pair(font_name(Face::Regular), REGULAR_FONT_ID)
            .pair(font_name(Face::Bold), BOLD_FONT_ID);
        if image.is_some() {
            resources.x_objects().pair(IMAGE_NAME, IMAGE_ID);
        }
    }
    out.object(PAGE_ID, chunk).await?;

    for (id, face) in [(REGULAR_FONT_ID, Face::Regular), (BOLD_FONT_ID, Face::Bold)] {
        let mut chunk = Chunk::new();
        chunk
            .type1_font(id)
            .base_font(Name(face.base_font()))
            .encoding_predefined(Name(b"WinAnsiEncoding"));
        out.object(id, chunk).await?;
    }

    let data = page_content(sheet);
    let mut chunk = Chunk::new();
    chunk.stream(CONTENT_ID, &data);
    out.object(CONTENT_ID, chunk).await?;

    if let Some(image) = image {
        let compressed = compress_to_vec_zlib(&image.pixels, 6);
        let mut chunk = Chunk::new();
        {
            let mut xobject = chunk.image_xobject(IMAGE_ID, &compressed);
            xobject.filter(Filter::FlateDecode);
            xobject.width(image.width as i32);
            xobject.height(image.height as i32);
            xobject.color_space().device_gray();
            xobject.bits_per_component(8);
        }
        out.object(IMAGE_ID, chunk).await?;
    }

    out.finish().await
}
