use crate::header::HeaderPolicy;

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct CrushOptions {
    pub delimiter: char,
    pub no_header: bool,              // never treat the first row as a header
    pub force_header: bool,           // always treat it as one (no_header wins)
    pub max_open_files: usize,        // split: simultaneously open bucket files
    pub progress: bool,               // row spinner on stderr
    pub progress_label: Option<String>,

    // IO tuning
    pub read_buffer_bytes: usize,     // BufReader capacity
    pub write_buffer_bytes: usize,    // BufWriter capacity, also per split bucket
}

impl Default for CrushOptions {
    fn default() -> Self {
        let default_read = 256 * 1024;
        let default_write = 256 * 1024;

        Self {
            delimiter: ',',
            no_header: false,
            force_header: false,
            max_open_files: 512,
            progress: false,
            progress_label: None,

            read_buffer_bytes: default_read,
            write_buffer_bytes: default_write,
        }
    }
}

impl CrushOptions {
    pub fn with_delimiter(mut self, delim: char) -> Self {
        self.delimiter = delim;
        self
    }
    pub fn with_no_header(mut self, yes: bool) -> Self {
        self.no_header = yes;
        self
    }
    pub fn with_force_header(mut self, yes: bool) -> Self {
        self.force_header = yes;
        self
    }
    pub fn with_max_open_files(mut self, n: usize) -> Self {
        self.max_open_files = n.max(1);
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }

    // IO buffers tuning
    pub fn with_io_read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer_bytes = bytes.max(8 * 1024);
        self
    }
    pub fn with_io_write_buffer(mut self, bytes: usize) -> Self {
        self.write_buffer_bytes = bytes.max(8 * 1024);
        self
    }
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }

    /// Header policy implied by the flags.
    pub fn header_policy(&self) -> HeaderPolicy {
        HeaderPolicy::new(self.no_header, self.force_header)
    }
}
