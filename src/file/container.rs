use std::{fs::File, path::Path};

use memmap2::Mmap;

use crate::Result;

use super::{DecodeOptions, DexFile, VerifyPreset};

/// A memory-mapped DEX file together with the options used to decode it.
pub struct DexFileContainer {
    mmap: Mmap,
    location: String,
    options: DecodeOptions,
}

impl DexFileContainer {
    pub fn new(file: &File) -> Result<Self> {
        // SAFETY: the mapping is read-only and only ever viewed as bytes
        let mmap = unsafe { Mmap::map(file)? };
        Ok(Self {
            mmap,
            location: "[anonymous]".to_string(),
            options: DecodeOptions::default(),
        })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(&file)?.location(path.as_ref().display().to_string()))
    }

    pub fn location(mut self, location: String) -> Self {
        self.location = location;
        self
    }

    pub fn verify(mut self, preset: VerifyPreset) -> Self {
        self.options.verify = preset;
        self
    }

    pub fn max_value_depth(mut self, max_value_depth: usize) -> Self {
        self.options.max_value_depth = max_value_depth;
        self
    }

    pub fn open(&self) -> Result<DexFile<'_>> {
        DexFile::open(self)
    }

    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    pub fn get_location(&self) -> &str {
        &self.location
    }

    pub fn data(&self) -> &[u8] {
        &self.mmap
    }
}
