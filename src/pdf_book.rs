use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tokio::fs;
use tracing::{debug, info};

/// Collects decoded pages in order and writes them out as one document.
#[async_trait]
pub trait Assembler: Send {
    /// Decodes the image at `path` and appends it as the next page.
    async fn add_page(&mut self, path: &Path) -> Result<()>;

    fn page_count(&self) -> usize;

    /// Writes every page added so far to `output`. Fails when empty.
    async fn save(&mut self, output: &Path) -> Result<()>;
}

/// Builds a PDF with one page per image, each page sized to its image.
pub struct PdfBook {
    document: Document,
    pages_id: ObjectId,
    page_ids: Vec<ObjectId>,
}

impl PdfBook {
    pub fn new() -> Self {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);

        Self {
            document,
            pages_id,
            page_ids: Vec::new(),
        }
    }

    fn push_rgb(&mut self, width: u32, height: u32, pixels: Vec<u8>) -> Result<()> {
        let (width, height) = (i64::from(width), i64::from(height));

        let mut image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            pixels,
        );
        // Deflate now so only compressed pages are held until `save`; on
        // failure the stream is kept raw.
        let _ = image.compress();
        let image_id = self.document.add_object(image);

        // Scale the unit square to the page and paint the image over it.
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        width.into(),
                        0.into(),
                        0.into(),
                        height.into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| anyhow!("Failed to encode page content: {}", e))?;
        let content_id = self
            .document
            .add_object(Stream::new(dictionary! {}, encoded));

        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => image_id,
                },
            },
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        });
        self.page_ids.push(page_id);

        Ok(())
    }
}

impl Default for PdfBook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Assembler for PdfBook {
    async fn add_page(&mut self, path: &Path) -> Result<()> {
        let data = fs::read(path)
            .await
            .map_err(|e| anyhow!("Failed to read image {}: {}", path.display(), e))?;

        let image = image::load_from_memory(&data)
            .map_err(|e| anyhow!("Failed to decode image {}: {}", path.display(), e))?
            .to_rgb8();
        let (width, height) = image.dimensions();

        self.push_rgb(width, height, image.into_raw())?;
        debug!(
            "Added {}x{} page {} from {}",
            width,
            height,
            self.page_ids.len(),
            path.display()
        );

        Ok(())
    }

    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    async fn save(&mut self, output: &Path) -> Result<()> {
        if self.page_ids.is_empty() {
            return Err(anyhow!("No pages added to the book"));
        }

        let kids: Vec<Object> = self.page_ids.iter().copied().map(Object::Reference).collect();
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => self.page_ids.len() as i64,
            }),
        );

        let mut data = Vec::new();
        self.document
            .save_to(&mut data)
            .map_err(|e| anyhow!("Failed to serialize PDF: {}", e))?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow!("Failed to create directory {}: {}", parent.display(), e))?;
        }

        // Write next to the target and rename, so a failed run never leaves a
        // truncated book at `output`.
        let partial = partial_path(output);
        let written = match fs::write(&partial, &data).await {
            Ok(()) => fs::rename(&partial, output).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&partial).await;
            return Err(anyhow!("Failed to write PDF to {}: {}", output.display(), e));
        }

        info!(
            "Saved {} pages into {}",
            self.page_ids.len(),
            output.display()
        );
        Ok(())
    }
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
