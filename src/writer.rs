//! Writer for generated events in the Les Houches Event File format
use std::fmt::Display;
use std::io::{self, Write};

use itertools::izip;
use thiserror::Error;

use crate::data::{EventRecord, RunInfo};
use crate::tags::*;

/// Layout version written to the opening tag
pub const LHEF_VERSION: &str = "3.0";

/// Writer for the LHEF format
#[derive(Debug)]
pub struct Writer<Stream: Write> {
    stream: Stream,
    events: usize,
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error(
        "Mismatch between the number of particle IDs and the length of at least one of \
         the status, mother, momentum, lifetime and spin lists"
    )]
    MismatchedParticles,
    #[error("Run information has to list at least one process")]
    NoProcesses,
    #[error("I/O error")]
    Io(#[from] io::Error),
}

impl<Stream: Write> Writer<Stream> {
    /// Start a new event file with the given format version
    pub fn new(mut stream: Stream, version: &str) -> Result<Self, WriteError> {
        for text in [LHEF_TAG_OPEN, "\"", version, "\">\n"] {
            stream.write_all(text.as_bytes())?;
        }
        Ok(Writer { stream, events: 0 })
    }

    fn write<T: Display + ?Sized>(&mut self, expr: &T) -> Result<(), io::Error> {
        write!(self.stream, "{expr}")
    }

    fn write_field<T: Display + ?Sized>(&mut self, expr: &T) -> Result<(), io::Error> {
        write!(self.stream, "{expr} ")
    }

    fn write_float(&mut self, x: f64) -> Result<(), io::Error> {
        let mut buffer = ryu::Buffer::new();
        self.stream.write_all(buffer.format(x).as_bytes())
    }

    fn write_float_field(&mut self, x: f64) -> Result<(), io::Error> {
        self.write_float(x)?;
        self.stream.write_all(b" ")
    }

    fn write_info(&mut self, info: &str) -> Result<(), io::Error> {
        if !info.is_empty() {
            self.write(info)?;
            if !info.ends_with('\n') {
                self.write("\n")?;
            }
        }
        Ok(())
    }

    /// Write a comment header
    pub fn header(&mut self, header: &str) -> Result<(), WriteError> {
        for text in [COMMENT_START, "\n", header, "\n", COMMENT_END, "\n"] {
            self.write(text)?;
        }
        Ok(())
    }

    /// Write the `<init>` block
    pub fn init(&mut self, runinfo: &RunInfo) -> Result<(), WriteError> {
        if runinfo.processes.is_empty() {
            return Err(WriteError::NoProcesses);
        }
        self.write(INIT_START)?;
        self.write("\n")?;
        for id in runinfo.beam_ids {
            self.write_field(&id)?;
        }
        for energy in runinfo.beam_energies {
            self.write_float_field(energy)?;
        }
        // no PDFs
        self.write("0 0 0 0 ")?;
        self.write_field(&runinfo.weighting)?;
        self.write(&runinfo.processes.len())?;
        self.write("\n")?;
        for process in &runinfo.processes {
            self.write_float_field(process.cross_section)?;
            self.write_float_field(process.error)?;
            self.write_float_field(process.max_weight)?;
            self.write(&process.id)?;
            self.write("\n")?;
        }
        self.write_info(&runinfo.info)?;
        self.write(INIT_END)?;
        self.write("\n")?;
        Ok(())
    }

    /// Write an `<event>` block
    pub fn event(&mut self, event: &EventRecord) -> Result<(), WriteError> {
        if !event.is_consistent() {
            return Err(WriteError::MismatchedParticles);
        }
        self.write(EVENT_START)?;
        self.write("\n")?;
        self.write_field(&event.len())?;
        self.write_field(&event.process_id)?;
        self.write_float_field(event.weight)?;
        // no scale and couplings
        self.write("-1 -1 -1\n")?;
        let particles = izip!(
            &event.ids,
            &event.statuses,
            &event.mothers,
            &event.momenta,
            &event.lifetimes,
            &event.spins,
        );
        for (id, status, mother, p, lifetime, spin) in particles {
            self.write_field(id)?;
            self.write_field(status)?;
            self.write_field(mother)?;
            self.write_field(mother)?;
            self.write("0 0 ")?;
            for &p in p {
                self.write_float_field(p)?;
            }
            self.write_float_field(*lifetime)?;
            self.write_float(*spin)?;
            self.write("\n")?;
        }
        self.write_info(&event.info)?;
        self.write(EVENT_END)?;
        self.write("\n")?;
        self.events += 1;
        Ok(())
    }

    /// Number of events written so far
    pub fn events(&self) -> usize {
        self.events
    }

    /// Close the event file and hand back the underlying stream
    pub fn finish(mut self) -> Result<Stream, WriteError> {
        self.write(LHEF_LAST_LINE)?;
        self.write("\n")?;
        self.stream.flush()?;
        tracing::info!("Wrote {} events", self.events);
        Ok(self.stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Process;
    use flate2::read::GzDecoder;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Read;

    fn event() -> EventRecord {
        EventRecord {
            process_id: 1,
            weight: 1.,
            ids: vec![421, -321, 211],
            statuses: vec![2, 1, 1],
            mothers: vec![0, 1, 1],
            momenta: vec![
                [0.5, -1.25, 30., 30.0721, 1.86484],
                [1.5, -0.25, 12., 12.1026, 0.493677],
                [-1., -1., 18., 17.9695, 0.13957],
            ],
            lifetimes: vec![0.1229, 0., 0.],
            spins: vec![9., 9., 9.],
            info: String::new(),
        }
    }

    #[test]
    fn write_gzipped() {
        let runinfo = RunInfo {
            processes: vec![Process {
                cross_section: 1.,
                error: 0.,
                max_weight: 1.,
                id: 7,
            }],
            info: "<generator>decaysim</generator>".to_owned(),
            ..Default::default()
        };
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut writer = Writer::new(encoder, LHEF_VERSION).unwrap();
        writer.header("D0 -> K- pi+").unwrap();
        writer.init(&runinfo).unwrap();
        for _ in 0..3 {
            writer.event(&event()).unwrap();
        }
        assert_eq!(writer.events(), 3);
        let compressed = writer.finish().unwrap().finish().unwrap();

        let mut text = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut text)
            .unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "<LesHouchesEvents version=\"3.0\">");
        assert_eq!(lines[1..4], ["<!--", "D0 -> K- pi+", "-->"]);
        assert_eq!(lines[4], "<init>");
        assert_eq!(lines[5], "2212 2212 6500.0 6500.0 0 0 0 0 3 1");
        assert_eq!(lines[6], "1.0 0.0 1.0 7");
        assert_eq!(lines[7], "<generator>decaysim</generator>");
        assert_eq!(lines[8], "</init>");
        assert_eq!(lines[9], "<event>");
        assert_eq!(lines[10], "3 1 1.0 -1 -1 -1");
        assert_eq!(
            lines[11],
            "421 2 0 0 0 0 0.5 -1.25 30.0 30.0721 1.86484 0.1229 9.0"
        );
        let kaon: Vec<_> = lines[12].split_whitespace().collect();
        assert_eq!(kaon.len(), 13);
        assert_eq!(kaon[..4], ["-321", "1", "1", "1"]);
        assert_eq!(lines.iter().filter(|l| **l == "<event>").count(), 3);
        assert_eq!(lines.last(), Some(&"</LesHouchesEvents>"));
    }

    #[test]
    fn reject_inconsistent_records() {
        let mut writer = Writer::new(Vec::new(), LHEF_VERSION).unwrap();
        let mut broken = event();
        broken.spins.pop();
        assert!(matches!(
            writer.event(&broken),
            Err(WriteError::MismatchedParticles)
        ));
        let runinfo = RunInfo {
            processes: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(writer.init(&runinfo), Err(WriteError::NoProcesses)));
        assert_eq!(writer.events(), 0);
    }
}
