//! Purpose: Resolve a request path to a readable plain DynGroup byte stream.
//! Exports: `ByteSource`, `OpenedSource`, `ScratchFile`, `ScratchNamer`, `RandomScratchNamer`,
//!   `ShortWritePolicy`, `IoWarning`, `default_scratch_dir`.
//! Role: Front end of the read pipeline; owns filename fallback and gzip inflation.
//! Invariants: Resolution order is plain `.dg` request, then request, `<request>.dg`, `<request>.dgz`.
//! Invariants: Gzip input is inflated into a `create_new` scratch file guarded by `ScratchFile`.
//! Invariants: The scratch file is removed when its guard drops, on every exit path.
//! Invariants: The reported resolved path is the candidate that opened, never the scratch path.
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::bufread::GzDecoder;
use getrandom::fill as fill_random;

use crate::core::error::{Error, ErrorKind};
use crate::core::format::{COMPRESSED_SUFFIX, GZIP_MAGIC, PLAIN_SUFFIX};

const CHUNK_LEN: usize = 2048;
const SCRATCH_CREATE_ATTEMPTS: usize = 8;
const SCRATCH_DIR_ENV: &str = "DGREAD_SCRATCH_DIR";

/// Scratch directory from `DGREAD_SCRATCH_DIR`, else the OS temp dir.
pub fn default_scratch_dir() -> PathBuf {
    std::env::var_os(SCRATCH_DIR_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

/// Supplies file names for scratch files. Names must be unlikely to collide
/// across processes and across concurrent calls in one process.
pub trait ScratchNamer {
    fn scratch_name(&self) -> Result<String, Error>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RandomScratchNamer;

impl ScratchNamer for RandomScratchNamer {
    fn scratch_name(&self) -> Result<String, Error> {
        let mut token = [0u8; 8];
        fill_random(&mut token).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to generate scratch file name: {err}"))
        })?;
        let token = token.iter().map(|b| format!("{b:02x}")).collect::<String>();
        Ok(format!(
            "dgread-{}-{token}.{PLAIN_SUFFIX}",
            std::process::id()
        ))
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ShortWritePolicy {
    /// Legacy behavior: warn, stop inflating, and read the truncated scratch file.
    Warn,
    /// Treat a short write as an unreadable container.
    #[default]
    Fail,
}

/// Non-fatal decompression mismatch recorded under `ShortWritePolicy::Warn`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IoWarning {
    pub path: PathBuf,
    pub expected: usize,
    pub written: usize,
    pub offset: u64,
}

impl IoWarning {
    pub fn message(&self) -> String {
        format!(
            "decompression write mismatch: wrote {} of {} bytes at offset {}",
            self.written, self.expected, self.offset
        )
    }
}

/// Owns a scratch file path and removes the file on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn create(dir: &Path, namer: &dyn ScratchNamer) -> Result<(Self, File), Error> {
        let mut last_err = None;
        for _ in 0..SCRATCH_CREATE_ATTEMPTS {
            let path = dir.join(namer.scratch_name()?);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    tracing::debug!(path = %path.display(), "created scratch file");
                    return Ok((Self { path }, file));
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    last_err = Some(err);
                }
                Err(err) => {
                    return Err(Error::new(ErrorKind::Io)
                        .with_message("failed to create scratch file")
                        .with_path(path)
                        .with_source(err));
                }
            }
        }
        let mut err = Error::new(ErrorKind::Io)
            .with_message("could not find an unused scratch file name")
            .with_path(dir)
            .with_hint("Check the scratch namer or pass a different --scratch-dir.");
        if let Some(source) = last_err {
            err = err.with_source(source);
        }
        Err(err)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed scratch file"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove scratch file");
            }
        }
    }
}

/// A readable plain byte stream plus everything the caller must keep alive
/// (and eventually drop) while reading it.
#[derive(Debug)]
pub struct OpenedSource {
    pub reader: File,
    pub resolved: PathBuf,
    pub scratch: Option<ScratchFile>,
    pub warnings: Vec<IoWarning>,
}

pub struct ByteSource<'a> {
    scratch_dir: &'a Path,
    namer: &'a dyn ScratchNamer,
    short_write: ShortWritePolicy,
}

impl<'a> ByteSource<'a> {
    pub fn new(
        scratch_dir: &'a Path,
        namer: &'a dyn ScratchNamer,
        short_write: ShortWritePolicy,
    ) -> Self {
        Self {
            scratch_dir,
            namer,
            short_write,
        }
    }

    pub fn open(&self, request: &str) -> Result<OpenedSource, Error> {
        if request.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("empty file name")
                .with_hint("Pass the path of a .dg or .dgz file."));
        }

        if is_plain_request(request) {
            let reader = File::open(request).map_err(|err| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!("error opening data file \"{request}\""))
                    .with_path(request)
                    .with_source(err)
            })?;
            tracing::debug!(path = request, "opened plain dg file");
            return Ok(OpenedSource {
                reader,
                resolved: PathBuf::from(request),
                scratch: None,
                warnings: Vec::new(),
            });
        }

        let candidates = [
            request.to_string(),
            format!("{request}.{PLAIN_SUFFIX}"),
            format!("{request}.{COMPRESSED_SUFFIX}"),
        ];
        // A candidate that existed but failed to inflate outranks an absent one.
        let mut cause: Option<Error> = None;
        for candidate in candidates {
            match self.open_candidate(Path::new(&candidate)) {
                Ok(opened) => return Ok(opened),
                Err(Candidate::Rejected(err)) => {
                    tracing::debug!(candidate = %candidate, error = %err, "candidate rejected");
                    if cause
                        .as_ref()
                        .is_none_or(|prev| prev.kind() != ErrorKind::Format)
                    {
                        cause = Some(err);
                    }
                }
                Err(Candidate::Fatal(err)) => return Err(err),
            }
        }

        let mut err = Error::new(ErrorKind::NotFound)
            .with_message(format!("file {request} not found"))
            .with_path(request)
            .with_hint(format!(
                "Tried {request}, {request}.{PLAIN_SUFFIX} and {request}.{COMPRESSED_SUFFIX}."
            ));
        if let Some(source) = cause {
            err = err.with_source(source);
        }
        Err(err)
    }

    fn open_candidate(&self, path: &Path) -> Result<OpenedSource, Candidate> {
        let file = File::open(path).map_err(|err| {
            Candidate::Rejected(
                Error::new(ErrorKind::NotFound)
                    .with_path(path)
                    .with_source(err),
            )
        })?;
        let mut input = BufReader::new(file);
        let is_gzip = {
            let head = input.fill_buf().map_err(|err| {
                Candidate::Rejected(
                    Error::new(ErrorKind::NotFound)
                        .with_message("failed to read candidate")
                        .with_path(path)
                        .with_source(err),
                )
            })?;
            head.starts_with(&GZIP_MAGIC)
        };

        if !is_gzip {
            // Non-gzip candidates are read as-is, like zlib's transparent mode.
            let mut reader = input.into_inner();
            reader.seek(SeekFrom::Start(0)).map_err(|err| {
                Candidate::Fatal(
                    Error::new(ErrorKind::Io)
                        .with_message("failed to rewind candidate")
                        .with_path(path)
                        .with_source(err),
                )
            })?;
            tracing::debug!(path = %path.display(), "opened candidate as plain bytes");
            return Ok(OpenedSource {
                reader,
                resolved: path.to_path_buf(),
                scratch: None,
                warnings: Vec::new(),
            });
        }

        let (scratch, mut out) =
            ScratchFile::create(self.scratch_dir, self.namer).map_err(Candidate::Fatal)?;
        let warning = self.inflate_into(path, input, &mut out)?;
        drop(out);

        let reader = File::open(scratch.path()).map_err(|err| {
            Candidate::Fatal(
                Error::new(ErrorKind::Io)
                    .with_message("failed to reopen scratch file")
                    .with_path(scratch.path())
                    .with_source(err),
            )
        })?;
        tracing::debug!(path = %path.display(), scratch = %scratch.path().display(), "inflated gzip candidate");
        Ok(OpenedSource {
            reader,
            resolved: path.to_path_buf(),
            scratch: Some(scratch),
            warnings: warning.into_iter().collect(),
        })
    }

    /// Inflates the gzip members of `input` into `out`. A tolerated short
    /// write is reported against the candidate `path`.
    fn inflate_into<R: BufRead, W: Write>(
        &self,
        path: &Path,
        input: R,
        out: &mut W,
    ) -> Result<Option<IoWarning>, Candidate> {
        let mut members = GzMembers::new(input);
        let warning = gz_uncompress(&mut members, out, self.short_write)
            .map_err(|candidate| candidate.map(|err| err.with_path(path)))?
            .map(|(expected, written, offset)| IoWarning {
                path: path.to_path_buf(),
                expected,
                written,
                offset,
            });
        // Reported to the caller as an `IoWarning`; the CLI turns it into a notice.
        if let Some(warning) = &warning {
            tracing::debug!(path = %path.display(), "{}", warning.message());
        }
        Ok(warning)
    }
}

/// Concatenated gzip members. Bytes after a member that do not start another
/// member end the stream, as zlib's `gzread` does.
struct GzMembers<R: BufRead> {
    decoder: Option<GzDecoder<R>>,
}

impl<R: BufRead> GzMembers<R> {
    fn new(input: R) -> Self {
        Self {
            decoder: Some(GzDecoder::new(input)),
        }
    }
}

impl<R: BufRead> Read for GzMembers<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = match self.decoder.as_mut() {
                Some(decoder) => decoder.read(buf)?,
                None => return Ok(0),
            };
            if n > 0 {
                return Ok(n);
            }
            let mut input = match self.decoder.take() {
                Some(decoder) => decoder.into_inner(),
                None => return Ok(0),
            };
            let rest = input.fill_buf()?;
            if rest.starts_with(&GZIP_MAGIC) {
                self.decoder = Some(GzDecoder::new(input));
                continue;
            }
            if !rest.is_empty() {
                tracing::debug!(
                    buffered = rest.len(),
                    "ignoring trailing bytes after last gzip member"
                );
            }
            return Ok(0);
        }
    }
}

/// Outcome of a failed candidate: `Rejected` moves on to the next suffix.
enum Candidate {
    Rejected(Error),
    Fatal(Error),
}

impl Candidate {
    fn map(self, f: impl FnOnce(Error) -> Error) -> Self {
        match self {
            Candidate::Rejected(err) => Candidate::Rejected(f(err)),
            Candidate::Fatal(err) => Candidate::Fatal(f(err)),
        }
    }
}

fn is_plain_request(request: &str) -> bool {
    Path::new(request)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.contains(PLAIN_SUFFIX) && !ext.contains(COMPRESSED_SUFFIX))
}

/// Copies `input` to `out` in fixed chunks, one `write` call per chunk.
/// Returns `(expected, written, offset)` when a short write was tolerated.
/// A corrupt input stream rejects the candidate; scratch-side failures are fatal.
fn gz_uncompress<R: Read, W: Write>(
    input: &mut R,
    out: &mut W,
    policy: ShortWritePolicy,
) -> Result<Option<(usize, usize, u64)>, Candidate> {
    let mut buf = [0u8; CHUNK_LEN];
    let mut offset = 0u64;
    loop {
        let len = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(len) => len,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(Candidate::Rejected(
                    Error::new(ErrorKind::Format)
                        .with_message("invalid gzip stream")
                        .with_offset(offset)
                        .with_source(err),
                ));
            }
        };
        let written = out.write(&buf[..len]).map_err(|err| {
            Candidate::Fatal(
                Error::new(ErrorKind::Io)
                    .with_message("failed to write scratch file")
                    .with_offset(offset)
                    .with_source(err),
            )
        })?;
        if written != len {
            match policy {
                ShortWritePolicy::Warn => return Ok(Some((len, written, offset))),
                ShortWritePolicy::Fail => {
                    return Err(Candidate::Fatal(
                        Error::new(ErrorKind::Format)
                            .with_message(format!(
                                "decompression write mismatch: wrote {written} of {len} bytes"
                            ))
                            .with_offset(offset)
                            .with_hint("Re-run with --short-write warn to read the truncated data."),
                    ));
                }
            }
        }
        offset += len as u64;
    }
    out.flush().map_err(|err| {
        Candidate::Fatal(
            Error::new(ErrorKind::Io)
                .with_message("failed to flush scratch file")
                .with_source(err),
        )
    })?;
    Ok(None)
}
