use std::io::BufRead;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::debug;

use super::{StatsCollector, Walker, WalkerLimits};
use crate::cancel::CancellationFlag;
use crate::document::{decode_cdata, decode_start, decode_text};
use crate::error::{IntrospectError, Result};
use crate::model::{Recovery, StructureSummary, WalkMode};

/// Feeds parser events straight into the statistics; no tree is built
/// beyond the bounded example captures.
#[derive(Debug, Clone)]
pub struct StreamingWalker {
    limits: WalkerLimits,
}

impl StreamingWalker {
    pub fn new(limits: WalkerLimits) -> Self {
        Self { limits }
    }
}

fn io_error(err: &quick_xml::Error) -> Option<std::io::Error> {
    match err {
        quick_xml::Error::Io(inner) => Some(std::io::Error::new(inner.kind(), inner.to_string())),
        _ => None,
    }
}

impl Walker for StreamingWalker {
    fn mode(&self) -> WalkMode {
        WalkMode::Streaming
    }

    fn analyze(
        &self,
        source: &mut dyn BufRead,
        cancel: &CancellationFlag,
    ) -> Result<StructureSummary> {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(true);

        let mut collector = StatsCollector::new(WalkMode::Streaming, self.limits.capture);
        let mut buf = Vec::with_capacity(8192);

        loop {
            cancel.check()?;
            let position = reader.buffer_position() as u64;
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(e) => {
                    if let Some(io) = io_error(&e) {
                        return Err(IntrospectError::Io(io));
                    }
                    if !collector.has_root() {
                        return Err(IntrospectError::ParseFailure {
                            details: e.to_string(),
                        });
                    }
                    collector.record_recovery(Recovery::Malformed {
                        position,
                        details: e.to_string(),
                    });
                    break;
                }
            };

            if let Event::Start(_) | Event::Empty(_) = event {
                if collector.root_closed() {
                    collector.record_recovery(Recovery::Malformed {
                        position,
                        details: "content after the root element".to_string(),
                    });
                    break;
                }
                if collector.total_element_count() >= self.limits.max_elements_streaming {
                    return Err(IntrospectError::TooLarge {
                        limit: self.limits.max_elements_streaming,
                    });
                }
            }

            let outcome = match event {
                Event::Start(e) => decode_start(&e).map(|tag| {
                    collector.open(
                        &tag.name,
                        tag.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                    )
                }),
                Event::Empty(e) => decode_start(&e).map(|tag| {
                    collector.open(
                        &tag.name,
                        tag.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                    );
                    collector.close();
                }),
                Event::End(_) => {
                    collector.close();
                    Ok(())
                }
                Event::Text(e) => decode_text(&e).map(|text| collector.text(&text)),
                Event::CData(e) => {
                    collector.text(&decode_cdata(e));
                    Ok(())
                }
                Event::Eof => {
                    if collector.depth() > 0 {
                        collector.record_recovery(Recovery::Malformed {
                            position,
                            details: format!(
                                "unexpected end of input with {} unclosed element(s)",
                                collector.depth()
                            ),
                        });
                    }
                    break;
                }
                _ => Ok(()),
            };

            if let Err(details) = outcome {
                if !collector.has_root() {
                    return Err(IntrospectError::ParseFailure { details });
                }
                collector.record_recovery(Recovery::Malformed { position, details });
                break;
            }
            buf.clear();
        }

        debug!(
            elements = collector.total_element_count(),
            "streaming walk finished"
        );
        collector.finish()
    }
}
