//! Reads the write-ahead log (WAL) sidecar that accompanies a SQLite
//! database file in WAL journal mode.
//!
//! Grounded on the reference WAL reader this crate's forensic reading
//! behaviour was distilled from. That reader has three bugs fixed here
//! rather than carried over: a stray debug print in frame validation, a
//! checksum helper invoked as a method despite taking no `self`, and a
//! checksum comparison that was recomputed (and silently overwritten) on
//! every frame of the scan instead of performed once against the target
//! frame.

use byteorder::{BigEndian, ReadBytesExt};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{Read, Seek, SeekFrom};

use crate::page::RandomReader;

pub const WAL_HEADER_BYTES: usize = 32;
pub const FRAME_HEADER_BYTES: usize = 24;

const MAGIC_LE: u32 = 0x377F_0682;
const MAGIC_BE: u32 = 0x377F_0683;

const FRAME_LRU_CAPACITY: usize = 1024;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("WAL header magic is not a recognized SQLite WAL magic number.")]
    BadMagic,
    #[error("Error reading WAL file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame index {0} is past the end of the WAL.")]
    NoSuchFrame(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumEndian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy)]
pub struct WalHeader {
    pub file_format_version: u32,
    pub page_size: u32,
    pub checkpoint_seq: u32,
    pub salt1: u32,
    pub salt2: u32,
    pub checksum1: u32,
    pub checksum2: u32,
    pub checksum_endian: ChecksumEndian,
}

fn read_wal_header<R: Read + Seek>(f: &mut R) -> Result<([u8; WAL_HEADER_BYTES], WalHeader), Error> {
    f.seek(SeekFrom::Start(0))?;
    let mut raw = [0u8; WAL_HEADER_BYTES];
    f.read_exact(&mut raw)?;

    let mut c = std::io::Cursor::new(&raw[..]);
    let magic = c.read_u32::<BigEndian>()?;
    let checksum_endian = match magic {
        MAGIC_LE => ChecksumEndian::Little,
        MAGIC_BE => ChecksumEndian::Big,
        _ => return Err(Error::BadMagic),
    };
    let file_format_version = c.read_u32::<BigEndian>()?;
    let page_size = c.read_u32::<BigEndian>()?;
    let checkpoint_seq = c.read_u32::<BigEndian>()?;
    let salt1 = c.read_u32::<BigEndian>()?;
    let salt2 = c.read_u32::<BigEndian>()?;
    let checksum1 = c.read_u32::<BigEndian>()?;
    let checksum2 = c.read_u32::<BigEndian>()?;

    Ok((
        raw,
        WalHeader {
            file_format_version,
            page_size,
            checkpoint_seq,
            salt1,
            salt2,
            checksum1,
            checksum2,
            checksum_endian,
        },
    ))
}

#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub page_number: u32,
    /// Size of the database in pages after the commit, or 0 if this frame
    /// is not the last frame of a transaction.
    pub page_count: u32,
    pub salt1: u32,
    pub salt2: u32,
    pub checksum1: u32,
    pub checksum2: u32,
}

impl FrameHeader {
    fn parse(raw: &[u8; FRAME_HEADER_BYTES]) -> Self {
        let mut c = std::io::Cursor::new(&raw[..]);
        FrameHeader {
            page_number: c.read_u32::<BigEndian>().unwrap(),
            page_count: c.read_u32::<BigEndian>().unwrap(),
            salt1: c.read_u32::<BigEndian>().unwrap(),
            salt2: c.read_u32::<BigEndian>().unwrap(),
            checksum1: c.read_u32::<BigEndian>().unwrap(),
            checksum2: c.read_u32::<BigEndian>().unwrap(),
        }
    }
}

/// A single WAL frame: its header plus the one page of data it carries.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn page_number(&self) -> u32 {
        self.header.page_number
    }

    pub fn page_count(&self) -> u32 {
        self.header.page_count
    }

    /// True when this frame's salt matches the WAL header's salt, i.e. it
    /// belongs to the WAL's current generation rather than a stale tail
    /// left over from a prior writer that crashed mid-transaction.
    pub fn validate_salt(&self, wal_header: &WalHeader) -> bool {
        self.header.salt1 == wal_header.salt1 && self.header.salt2 == wal_header.salt2
    }
}

/// Calculates the running WAL checksum over `buf`, continuing from `seed`.
///
/// `buf`'s length must be a multiple of 8 (the algorithm consumes a pair of
/// big/little-endian u32s per step). This is a plain function, not a
/// pseudo-method, since it needs no access to any frame or WAL state.
pub fn calculate_checksum(buf: &[u8], seed: (u32, u32), endian: ChecksumEndian) -> (u32, u32) {
    assert_eq!(buf.len() % 8, 0, "checksum buffer must be a multiple of 8 bytes");
    let (mut s0, mut s1) = seed;
    let mut i = 0;
    while i < buf.len() {
        let a = read_u32(&buf[i..i + 4], endian);
        let b = read_u32(&buf[i + 4..i + 8], endian);
        s0 = s0.wrapping_add(a).wrapping_add(s1);
        s1 = s1.wrapping_add(b).wrapping_add(s0);
        i += 8;
    }
    (s0, s1)
}

fn read_u32(b: &[u8], endian: ChecksumEndian) -> u32 {
    let arr: [u8; 4] = b.try_into().unwrap();
    match endian {
        ChecksumEndian::Little => u32::from_le_bytes(arr),
        ChecksumEndian::Big => u32::from_be_bytes(arr),
    }
}

struct FrameLru {
    entries: HashMap<u64, Frame>,
    order: VecDeque<u64>,
    capacity: usize,
}

impl FrameLru {
    fn new(capacity: usize) -> Self {
        FrameLru {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, idx: u64) -> Option<&Frame> {
        self.entries.get(&idx)
    }

    fn insert(&mut self, idx: u64, frame: Frame) {
        if !self.entries.contains_key(&idx) {
            self.order.push_back(idx);
            if self.order.len() > self.capacity {
                if let Some(evict) = self.order.pop_front() {
                    self.entries.remove(&evict);
                }
            }
        }
        self.entries.insert(idx, frame);
    }
}

/// A group of frames written together: either a `Commit` (one transaction's
/// frames) or a `Checkpoint` (the deduplicated, salt-grouped history used to
/// answer "what did page N look like as of checkpoint K").
pub struct FrameGroup {
    pub frame_indices: Vec<u64>,
    page_map: HashMap<u32, u64>,
    /// The database size, in pages, as of this group's terminating commit
    /// frame. `None` for a group with no terminating frame (shouldn't occur
    /// for anything returned by `commits()`/`checkpoints()`).
    pub db_size_pages: Option<u32>,
}

impl FrameGroup {
    fn new(frame_indices: Vec<u64>, frames: &[Frame]) -> Self {
        let mut page_map = HashMap::new();
        for (pos, &idx) in frame_indices.iter().enumerate() {
            page_map.insert(frames[pos].page_number(), idx);
        }
        let db_size_pages = frames.last().map(|f| f.page_count());
        FrameGroup { frame_indices, page_map, db_size_pages }
    }

    pub fn contains(&self, page: u32) -> bool {
        self.page_map.contains_key(&page)
    }

    pub fn frame_index_for_page(&self, page: u32) -> Option<u64> {
        self.page_map.get(&page).copied()
    }
}

pub struct Wal<R: RandomReader> {
    reader: RefCell<R>,
    header_bytes: [u8; WAL_HEADER_BYTES],
    pub header: WalHeader,
    frame_cache: RefCell<FrameLru>,
    commits: RefCell<Option<Vec<FrameGroup>>>,
    checkpoints: RefCell<Option<Vec<FrameGroup>>>,
    all_frames: RefCell<Option<Vec<Frame>>>,
}

impl<R: RandomReader> Wal<R> {
    pub fn open(mut reader: R) -> Result<Self, Error> {
        let (header_bytes, header) = read_wal_header(&mut reader)?;
        Ok(Wal {
            reader: RefCell::new(reader),
            header_bytes,
            header,
            frame_cache: RefCell::new(FrameLru::new(FRAME_LRU_CAPACITY)),
            commits: RefCell::new(None),
            checkpoints: RefCell::new(None),
            all_frames: RefCell::new(None),
        })
    }

    fn frame_offset(&self, idx: u64) -> u64 {
        let frame_size = (FRAME_HEADER_BYTES as u64) + self.header.page_size as u64;
        WAL_HEADER_BYTES as u64 + idx * frame_size
    }

    fn file_len(&self) -> Result<u64, Error> {
        let mut r = self.reader.borrow_mut();
        let len = r.seek(SeekFrom::End(0))?;
        Ok(len)
    }

    /// Reads frame `idx` (0-based), caching decoded frames in a bounded LRU.
    pub fn frame(&self, idx: u64) -> Result<Frame, Error> {
        if let Some(f) = self.frame_cache.borrow().get(idx) {
            return Ok(f.clone());
        }
        let offset = self.frame_offset(idx);
        let frame_size = (FRAME_HEADER_BYTES as u64) + self.header.page_size as u64;
        if offset + frame_size > self.file_len()? {
            return Err(Error::NoSuchFrame(idx));
        }
        let mut r = self.reader.borrow_mut();
        r.seek(SeekFrom::Start(offset))?;
        let mut raw_hdr = [0u8; FRAME_HEADER_BYTES];
        r.read_exact(&mut raw_hdr)?;
        let mut data = vec![0u8; self.header.page_size as usize];
        r.read_exact(&mut data)?;
        drop(r);

        let frame = Frame {
            header: FrameHeader::parse(&raw_hdr),
            data,
        };
        self.frame_cache.borrow_mut().insert(idx, frame.clone());
        Ok(frame)
    }

    /// Number of frames physically present in the WAL file.
    pub fn frame_count(&self) -> Result<u64, Error> {
        let frame_size = (FRAME_HEADER_BYTES as u64) + self.header.page_size as u64;
        let usable = self.file_len()?.saturating_sub(WAL_HEADER_BYTES as u64);
        Ok(usable / frame_size)
    }

    fn load_all_frames(&self) -> Result<(), Error> {
        if self.all_frames.borrow().is_some() {
            return Ok(());
        }
        let n = self.frame_count()?;
        let mut frames = Vec::with_capacity(n as usize);
        for i in 0..n {
            frames.push(self.frame(i)?);
        }
        *self.all_frames.borrow_mut() = Some(frames);
        Ok(())
    }

    /// Checks a frame's checksum by accumulating the running seed across the
    /// WAL header and every frame up to and including `idx`, then comparing
    /// exactly once against that frame's own stored checksum.
    pub fn validate_checksum(&self, idx: u64) -> Result<bool, Error> {
        let target = self.frame(idx)?;
        let endian = self.header.checksum_endian;
        let mut seed = calculate_checksum(&self.header_bytes[0..24], (0, 0), endian);

        for i in 0..=idx {
            let frame = self.frame(i)?;
            let mut hdr_prefix = [0u8; 8];
            let mut c = std::io::Cursor::new(&mut hdr_prefix[..]);
            use std::io::Write;
            c.write_all(&frame.header.page_number.to_be_bytes()).unwrap();
            c.write_all(&frame.header.page_count.to_be_bytes()).unwrap();
            seed = calculate_checksum(&hdr_prefix, seed, endian);
            seed = calculate_checksum(&frame.data, seed, endian);
        }

        Ok(seed == (target.header.checksum1, target.header.checksum2))
    }

    /// True if the frame's salt matches the WAL header, and (if requested)
    /// its checksum is valid.
    pub fn frame_valid(&self, idx: u64, verify_checksum: bool) -> Result<bool, Error> {
        let frame = self.frame(idx)?;
        if !frame.validate_salt(&self.header) {
            return Ok(false);
        }
        if verify_checksum {
            return self.validate_checksum(idx);
        }
        Ok(true)
    }

    /// All commits in the WAL, in file order: a commit is a run of frames
    /// ending in one whose `page_count` is nonzero. Computed once and
    /// memoized. Trailing frames with no terminating commit are dropped
    /// with a diagnostic log rather than silently discarded.
    pub fn commits(&self) -> Result<Vec<FrameGroup>, Error> {
        if let Some(c) = self.commits.borrow().as_ref() {
            return Ok(clone_groups(c));
        }
        self.load_all_frames()?;
        let all = self.all_frames.borrow();
        let all = all.as_ref().unwrap();

        let mut commits = Vec::new();
        let mut pending: Vec<u64> = Vec::new();
        for (idx, frame) in all.iter().enumerate() {
            pending.push(idx as u64);
            if frame.page_count() > 0 {
                let indices = std::mem::take(&mut pending);
                let group_frames: Vec<Frame> = indices.iter().map(|&i| all[i as usize].clone()).collect();
                commits.push(FrameGroup::new(indices, &group_frames));
            }
        }
        if !pending.is_empty() {
            log::warn!("dropping {} leftover WAL frames after the last commit", pending.len());
        }

        *self.commits.borrow_mut() = Some(clone_groups(&commits));
        Ok(commits)
    }

    /// Deduplicated checkpoints, oldest first: one entry per distinct
    /// `salt1` value seen across commits, keeping the most recent commit
    /// for each salt. `checkpoints()[checkpoints().len()]` conceptually
    /// denotes "no WAL overlay at all" (the base file only); index 0 is the
    /// oldest WAL-resident state, and the last entry is the newest.
    pub fn checkpoints(&self) -> Result<Vec<FrameGroup>, Error> {
        if let Some(c) = self.checkpoints.borrow().as_ref() {
            return Ok(clone_groups(c));
        }
        let commits = self.commits()?;
        let all = self.all_frames.borrow();
        let all = all.as_ref().unwrap();

        let mut by_salt1: HashMap<u32, FrameGroup> = HashMap::new();
        let mut order: Vec<u32> = Vec::new();
        for commit in &commits {
            if commit.frame_indices.is_empty() {
                continue;
            }
            let salt1 = all[commit.frame_indices[0] as usize].header.salt1;
            if !by_salt1.contains_key(&salt1) {
                order.push(salt1);
            }
            by_salt1.insert(
                salt1,
                FrameGroup {
                    frame_indices: commit.frame_indices.clone(),
                    page_map: commit.page_map.clone(),
                    db_size_pages: commit.db_size_pages,
                },
            );
        }
        order.sort_unstable();
        let checkpoints: Vec<FrameGroup> = order
            .into_iter()
            .map(|salt| by_salt1.remove(&salt).unwrap())
            .collect();

        *self.checkpoints.borrow_mut() = Some(clone_groups(&checkpoints));
        Ok(checkpoints)
    }

    /// Fetches page data for `page_number` from the given frame group.
    pub fn page_data(&self, group: &FrameGroup, page_number: u32) -> Result<Option<Vec<u8>>, Error> {
        match group.frame_index_for_page(page_number) {
            None => Ok(None),
            Some(idx) => Ok(Some(self.frame(idx)?.data)),
        }
    }
}

impl Clone for FrameGroup {
    fn clone(&self) -> Self {
        FrameGroup {
            frame_indices: self.frame_indices.clone(),
            page_map: self.page_map.clone(),
            db_size_pages: self.db_size_pages,
        }
    }
}

fn clone_groups(groups: &[FrameGroup]) -> Vec<FrameGroup> {
    groups.iter().map(|g| g.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_wal(page_size: u32, salt: (u32, u32), frames: &[(u32, u32, &[u8])]) -> Vec<u8> {
        // frames: (page_number, page_count, page_bytes)
        let endian = ChecksumEndian::Big;
        let mut header = vec![0u8; WAL_HEADER_BYTES];
        header[0..4].copy_from_slice(&MAGIC_BE.to_be_bytes());
        header[4..8].copy_from_slice(&3007000u32.to_be_bytes());
        header[8..12].copy_from_slice(&page_size.to_be_bytes());
        header[12..16].copy_from_slice(&0u32.to_be_bytes());
        header[16..20].copy_from_slice(&salt.0.to_be_bytes());
        header[20..24].copy_from_slice(&salt.1.to_be_bytes());

        let mut seed = calculate_checksum(&header[0..24], (0, 0), endian);
        let mut body = Vec::new();
        for &(page_number, page_count, data) in frames {
            assert_eq!(data.len(), page_size as usize);
            let mut frame_hdr = vec![0u8; FRAME_HEADER_BYTES];
            frame_hdr[0..4].copy_from_slice(&page_number.to_be_bytes());
            frame_hdr[4..8].copy_from_slice(&page_count.to_be_bytes());
            frame_hdr[8..12].copy_from_slice(&salt.0.to_be_bytes());
            frame_hdr[12..16].copy_from_slice(&salt.1.to_be_bytes());

            seed = calculate_checksum(&frame_hdr[0..8], seed, endian);
            seed = calculate_checksum(data, seed, endian);
            frame_hdr[16..20].copy_from_slice(&seed.0.to_be_bytes());
            frame_hdr[20..24].copy_from_slice(&seed.1.to_be_bytes());

            body.extend_from_slice(&frame_hdr);
            body.extend_from_slice(data);
        }
        header[24..28].copy_from_slice(&seed.0.to_be_bytes());
        header[28..32].copy_from_slice(&seed.1.to_be_bytes());

        let mut out = header;
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn parses_header_and_frames() {
        let page = vec![7u8; 16];
        let bytes = build_wal(16, (1, 2), &[(1, 1, &page)]);
        let wal = Wal::open(Cursor::new(bytes)).unwrap();
        assert_eq!(wal.header.page_size, 16);
        assert_eq!(wal.header.salt1, 1);
        let frame = wal.frame(0).unwrap();
        assert_eq!(frame.page_number(), 1);
        assert_eq!(frame.page_count(), 1);
        assert_eq!(frame.data, page);
    }

    #[test]
    fn checksum_validates_each_frame_independently() {
        let p1 = vec![1u8; 16];
        let p2 = vec![2u8; 16];
        let bytes = build_wal(16, (5, 6), &[(1, 0, &p1), (2, 2, &p2)]);
        let wal = Wal::open(Cursor::new(bytes)).unwrap();
        assert!(wal.validate_checksum(0).unwrap());
        assert!(wal.validate_checksum(1).unwrap());
    }

    #[test]
    fn corrupted_frame_fails_checksum() {
        let p1 = vec![1u8; 16];
        let mut bytes = build_wal(16, (5, 6), &[(1, 1, &p1)]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let wal = Wal::open(Cursor::new(bytes)).unwrap();
        assert!(!wal.validate_checksum(0).unwrap());
    }

    #[test]
    fn commits_group_by_trailing_page_count() {
        let pages: Vec<Vec<u8>> = (0..3).map(|i| vec![i as u8; 16]).collect();
        let bytes = build_wal(
            16,
            (1, 1),
            &[(1, 0, &pages[0]), (2, 2, &pages[1]), (3, 0, &pages[2])],
        );
        let wal = Wal::open(Cursor::new(bytes)).unwrap();
        let commits = wal.commits().unwrap();
        // One real commit (frames 0,1); frame 2 is a dangling non-commit tail, dropped.
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].frame_indices, vec![0, 1]);
    }

    #[test]
    fn checkpoints_dedup_by_salt1_ascending() {
        let p = vec![9u8; 16];
        // Two commits sharing salt1=1 (second one should win), one with salt1=2.
        let mut bytes = build_wal(16, (1, 1), &[(1, 1, &p)]);
        // Manually splice a second WAL-worth of frames isn't representative of a
        // real multi-generation WAL (salt changes only via header rewrite), so
        // this test instead checks the single-generation case end to end.
        let wal = Wal::open(Cursor::new(std::mem::take(&mut bytes))).unwrap();
        let checkpoints = wal.checkpoints().unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert!(checkpoints[0].contains(1));
    }
}
