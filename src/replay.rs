//! Capture file replay.
//!
//! Reads classic PCAP and PCAPNG files with `pcap_parser` and submits every
//! packet to a [`Session`] as a [`CaptureRecord`]. Ethernet link types get the
//! `[eth]` hint the built-in dissectors start from; any other link type gets
//! a `[link:N]` hint and is stored undecoded unless a custom dissector claims
//! it.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError, PcapNGReader};
use tracing::{debug, info};

use capflow_core::{CaptureRecord, Error, Session, Token, LINK_ETHERNET};

/// Buffer size for pcap_parser readers (256KB).
const BUFFER_SIZE: usize = 262144;

/// Link type constant for Ethernet.
pub const LINKTYPE_ETHERNET: u32 = 1;

/// Format of the capture file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureFormat {
    /// Classic PCAP (little-endian, microseconds)
    LegacyLeMicro,
    /// Classic PCAP (big-endian, microseconds)
    LegacyBeMicro,
    /// Classic PCAP (little-endian, nanoseconds)
    LegacyLeNano,
    /// Classic PCAP (big-endian, nanoseconds)
    LegacyBeNano,
    PcapNg,
}

impl CaptureFormat {
    /// Detect the format from the file's magic bytes.
    pub fn detect(data: &[u8]) -> Result<Self> {
        let magic: [u8; 4] = data
            .get(..4)
            .and_then(|m| m.try_into().ok())
            .ok_or_else(|| anyhow!("data too small for a capture file magic"))?;

        match u32::from_le_bytes(magic) {
            0xa1b2c3d4 => Ok(CaptureFormat::LegacyLeMicro),
            0xd4c3b2a1 => Ok(CaptureFormat::LegacyBeMicro),
            0xa1b23c4d => Ok(CaptureFormat::LegacyLeNano),
            0x4d3cb2a1 => Ok(CaptureFormat::LegacyBeNano),
            0x0a0d0d0a => Ok(CaptureFormat::PcapNg),
            other => bail!("unknown capture file magic: 0x{other:08x}"),
        }
    }

    pub fn is_pcapng(&self) -> bool {
        matches!(self, CaptureFormat::PcapNg)
    }

    fn is_nanosecond(&self) -> bool {
        matches!(self, CaptureFormat::LegacyLeNano | CaptureFormat::LegacyBeNano)
    }
}

/// One captured packet.
#[derive(Debug, Clone)]
pub struct Packet {
    pub link_type: u32,
    pub timestamp_us: i64,
    pub data: Bytes,
}

enum ReaderInner<R: Read> {
    Legacy(LegacyPcapReader<BufReader<R>>),
    Ng(PcapNGReader<BufReader<R>>),
}

/// PCAP/PCAPNG reader over any `Read` source.
pub struct CaptureReader<R: Read> {
    inner: ReaderInner<R>,
    link_type: u32,
    nanosecond: bool,
    packets: u64,
}

impl CaptureReader<File> {
    /// Open a capture file, detecting its format.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)
            .with_context(|| format!("failed to read {}", path.display()))?;
        file.seek(SeekFrom::Start(0))?;
        let format = CaptureFormat::detect(&magic)?;
        debug!(?format, path = %path.display(), "opened capture file");
        Self::with_format(file, format)
    }
}

impl<R: Read> CaptureReader<R> {
    pub fn with_format(source: R, format: CaptureFormat) -> Result<Self> {
        let buf_reader = BufReader::with_capacity(BUFFER_SIZE, source);
        let inner = if format.is_pcapng() {
            let reader = PcapNGReader::new(BUFFER_SIZE, buf_reader)
                .map_err(|e| anyhow!("failed to parse PCAPNG header: {e}"))?;
            ReaderInner::Ng(reader)
        } else {
            let reader = LegacyPcapReader::new(BUFFER_SIZE, buf_reader)
                .map_err(|e| anyhow!("failed to parse PCAP header: {e}"))?;
            ReaderInner::Legacy(reader)
        };
        Ok(Self {
            inner,
            link_type: LINKTYPE_ETHERNET,
            nanosecond: format.is_nanosecond(),
            packets: 0,
        })
    }

    /// Link type of the most recent header or interface block.
    pub fn link_type(&self) -> u32 {
        self.link_type
    }

    /// Packets read so far.
    pub fn packets(&self) -> u64 {
        self.packets
    }

    /// Read the next packet. Returns `Ok(None)` at end of file.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        let packet = match &mut self.inner {
            ReaderInner::Legacy(reader) => {
                next_legacy(reader, &mut self.link_type, self.nanosecond)?
            }
            ReaderInner::Ng(reader) => next_pcapng(reader, &mut self.link_type)?,
        };
        if packet.is_some() {
            self.packets += 1;
        }
        Ok(packet)
    }
}

fn next_legacy<S: Read>(
    reader: &mut LegacyPcapReader<S>,
    link_type: &mut u32,
    nanosecond: bool,
) -> Result<Option<Packet>> {
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let packet = match block {
                    PcapBlockOwned::Legacy(packet) => {
                        let fraction = if nanosecond {
                            packet.ts_usec as i64 / 1000
                        } else {
                            packet.ts_usec as i64
                        };
                        Some(Packet {
                            link_type: *link_type,
                            timestamp_us: packet.ts_sec as i64 * 1_000_000 + fraction,
                            data: Bytes::copy_from_slice(packet.data),
                        })
                    }
                    PcapBlockOwned::LegacyHeader(header) => {
                        *link_type = header.network.0 as u32;
                        None
                    }
                    _ => None,
                };
                reader.consume(offset);
                if packet.is_some() {
                    return Ok(packet);
                }
            }
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| anyhow!("PCAP refill error: {e}"))?;
            }
            Err(e) => bail!("PCAP parse error: {e}"),
        }
    }
}

fn next_pcapng<S: Read>(reader: &mut PcapNGReader<S>, link_type: &mut u32) -> Result<Option<Packet>> {
    use pcap_parser::pcapng::Block;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let packet = match block {
                    PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                        *link_type = idb.linktype.0 as u32;
                        None
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => Some(Packet {
                        link_type: *link_type,
                        timestamp_us: ((epb.ts_high as i64) << 32) | (epb.ts_low as i64),
                        data: Bytes::copy_from_slice(epb.data),
                    }),
                    PcapBlockOwned::NG(Block::SimplePacket(spb)) => Some(Packet {
                        link_type: *link_type,
                        timestamp_us: 0,
                        data: Bytes::copy_from_slice(spb.data),
                    }),
                    _ => None,
                };
                reader.consume(offset);
                if packet.is_some() {
                    return Ok(packet);
                }
            }
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| anyhow!("PCAPNG refill error: {e}"))?;
            }
            Err(e) => bail!("PCAPNG parse error: {e}"),
        }
    }
}

/// Outcome of replaying a capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Packets read from the capture
    pub packets: u64,
    /// Packets accepted by the session
    pub submitted: u64,
    /// Packets rejected by a full input queue
    pub dropped: u64,
}

/// Submit every packet of `reader` to a started `session`.
pub fn replay<R: Read>(session: &Session, reader: &mut CaptureReader<R>) -> Result<ReplayStats> {
    let tokens = session.tokens();
    let mut links: HashMap<u32, Token> = HashMap::new();
    let mut stats = ReplayStats::default();

    while let Some(packet) = reader.next_packet()? {
        stats.packets += 1;
        let link = *links.entry(packet.link_type).or_insert_with(|| {
            if packet.link_type == LINKTYPE_ETHERNET {
                tokens.get(LINK_ETHERNET)
            } else {
                tokens.get(&format!("[link:{}]", packet.link_type))
            }
        });

        match session.submit(CaptureRecord::new(link, packet.data, packet.timestamp_us)) {
            Ok(_) => stats.submitted += 1,
            Err(Error::QueueFull) => stats.dropped += 1,
            Err(e) => {
                return Err(e).with_context(|| format!("failed to submit packet {}", stats.packets))
            }
        }
    }

    info!(
        packets = stats.packets,
        submitted = stats.submitted,
        dropped = stats.dropped,
        "capture replayed"
    );
    Ok(stats)
}
