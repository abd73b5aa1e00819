use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Reads and writes whole pages of one table file. The file has no header:
/// page `n` starts at byte `n * page_size`.
pub struct PageManager {
    file: File,
    page_size: usize,
}

impl PageManager {
    /// Opens an existing file, or creates an empty one.
    pub fn open(path: &Path, page_size: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self { file, page_size })
    }

    pub fn read_page(&mut self, page_no: u32, buf: &mut [u8]) -> io::Result<()> {
        self.check_len(buf.len())?;

        let offset = self.page_offset(page_no);
        let file_size = self.file.metadata()?.len();
        if offset + self.page_size as u64 > file_size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("page {} does not exist", page_no),
            ));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    /// Writes one page. The page may be at most one past the current last
    /// page, so the file never grows by more than one page at a time.
    pub fn write_page(&mut self, page_no: u32, data: &[u8]) -> io::Result<()> {
        self.check_len(data.len())?;

        let offset = self.page_offset(page_no);
        let file_size = self.file.metadata()?.len();
        if offset > file_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "page {} is past the end of a file with {} pages",
                    page_no,
                    file_size / self.page_size as u64
                ),
            ));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.sync_all()
    }

    pub fn num_pages(&self) -> io::Result<u32> {
        let file_size = self.file.metadata()?.len();
        Ok((file_size / self.page_size as u64) as u32)
    }

    /// Appends a zeroed page and returns its number.
    pub fn allocate_page(&mut self) -> io::Result<u32> {
        let page_no = self.num_pages()?;
        let zeroes = vec![0u8; self.page_size];
        self.write_page(page_no, &zeroes)?;
        Ok(page_no)
    }

    fn check_len(&self, len: usize) -> io::Result<()> {
        if len != self.page_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("buffer size must be {}, got {}", self.page_size, len),
            ));
        }
        Ok(())
    }

    fn page_offset(&self, page_no: u32) -> u64 {
        page_no as u64 * self.page_size as u64
    }
}
