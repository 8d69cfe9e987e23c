use std::collections::HashMap;
use std::path::PathBuf;

use typst::diag::{FileError, FileResult};
use typst::foundations::{Bytes, Datetime};
use typst::syntax::{FileId, Source, VirtualPath};
use typst::text::{Font, FontBook};
use typst::utils::LazyHash;
use typst::{Library, LibraryExt, World};
use typst_kit::fonts::{FontSearcher, FontSlot, Fonts};

/// Fonts loaded once per process and shared by every document build.
///
/// Only embedded fonts are used: the documents are images plus metadata, so
/// a system font scan would cost startup time for nothing.
pub struct FontCache {
    book: LazyHash<FontBook>,
    fonts: Vec<FontSlot>,
}

impl Default for FontCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FontCache {
    pub fn new() -> Self {
        let Fonts { book, fonts } = FontSearcher::new().include_system_fonts(false).search();
        Self {
            book: LazyHash::new(book),
            fonts,
        }
    }
}

/// The Typst world for one archived document.
///
/// Serves a single virtual `/main.typ` plus the captured PNGs it references,
/// each mounted under a virtual name and read from disk on demand.
pub struct ArchiveWorld<'a> {
    library: LazyHash<Library>,
    fonts: &'a FontCache,
    main_id: FileId,
    main_source: Source,
    images: HashMap<FileId, PathBuf>,
}

impl<'a> ArchiveWorld<'a> {
    /// - `main_text`: complete Typst markup of the document
    /// - `images`: `(virtual name, file on disk)` pairs referenced by the markup
    pub fn new(main_text: &str, images: &[(String, PathBuf)], fonts: &'a FontCache) -> Self {
        let main_id = FileId::new(None, VirtualPath::new("main.typ"));
        let main_source = Source::new(main_id, main_text.to_string());
        let images = images
            .iter()
            .map(|(name, path)| (FileId::new(None, VirtualPath::new(name)), path.clone()))
            .collect();

        Self {
            library: LazyHash::new(Library::default()),
            fonts,
            main_id,
            main_source,
            images,
        }
    }
}

impl World for ArchiveWorld<'_> {
    fn library(&self) -> &LazyHash<Library> {
        &self.library
    }

    fn book(&self) -> &LazyHash<FontBook> {
        &self.fonts.book
    }

    fn main(&self) -> FileId {
        self.main_id
    }

    fn source(&self, id: FileId) -> FileResult<Source> {
        if id == self.main_id {
            Ok(self.main_source.clone())
        } else {
            Err(FileError::NotFound(id.vpath().as_rootless_path().into()))
        }
    }

    fn file(&self, id: FileId) -> FileResult<Bytes> {
        if id == self.main_id {
            return Ok(Bytes::from_string(self.main_source.clone()));
        }
        let path = self
            .images
            .get(&id)
            .ok_or_else(|| FileError::NotFound(id.vpath().as_rootless_path().into()))?;
        let data = std::fs::read(path).map_err(|e| FileError::from_io(e, path))?;
        Ok(Bytes::new(data))
    }

    fn font(&self, index: usize) -> Option<Font> {
        self.fonts.fonts.get(index)?.get()
    }

    fn today(&self, _offset: Option<i64>) -> Option<Datetime> {
        None
    }
}
