use crate::{
    protocol::RemoteFile,
    upload::{UploadJob, UploadJobTracker, UploadStatus},
};

#[derive(Debug, Clone, Default)]
pub struct FileCatalog {
    files: Vec<RemoteFile>,
    loaded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CatalogEntry<'a> {
    Upload(&'a UploadJob),
    File(&'a RemoteFile),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogView<'a> {
    Loading,
    Empty,
    Entries(Vec<CatalogEntry<'a>>),
}

impl FileCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, files: Vec<RemoteFile>) {
        self.files = files;
        self.loaded = true;
    }

    pub fn remove(&mut self, file_id: &str) -> Option<RemoteFile> {
        let index = self.files.iter().position(|file| file.id == file_id)?;
        Some(self.files.remove(index))
    }

    pub fn get(&self, file_id: &str) -> Option<&RemoteFile> {
        self.files.iter().find(|file| file.id == file_id)
    }

    pub fn files(&self) -> &[RemoteFile] {
        &self.files
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Newest uploads first (in flight or failed), then the server listing.
    /// Completed uploads are left out; they show up as regular files once
    /// the next refresh lands.
    pub fn view<'a>(&'a self, uploads: &'a UploadJobTracker) -> CatalogView<'a> {
        let mut entries: Vec<CatalogEntry<'a>> = uploads
            .jobs()
            .rev()
            .filter(|job| job.status != UploadStatus::Completed)
            .map(CatalogEntry::Upload)
            .collect();

        if entries.is_empty() && !self.loaded {
            return CatalogView::Loading;
        }

        entries.extend(self.files.iter().map(CatalogEntry::File));
        if entries.is_empty() {
            CatalogView::Empty
        } else {
            CatalogView::Entries(entries)
        }
    }
}
