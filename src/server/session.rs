use std::{fmt::Display, io, time::Duration};

use thiserror::Error;
use tokio::{
    io::{
        AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
        WriteHalf, split,
    },
    time::timeout,
};

use crate::{
    defs::{FanSpeed, TimeOfDay, TimeParseError},
    hardware::{Clock, Sensors},
    state::SharedState,
};

const TELEMETRY_INTERVAL: Duration = Duration::from_secs(1);

/// One connected peer's interaction with the command protocol.
///
/// Commands are single ASCII bytes (surrounding CR/LF is ignored); every
/// variable-length argument is a newline-terminated line, time arguments in
/// `"HH:MM:SS"` form. All argument bytes of a command are read before the
/// state lock is taken, so an aborted command never half-mutates state.
pub struct Session<'h, T, S, C> {
    reader: BufReader<ReadHalf<T>>,
    writer: WriteHalf<T>,

    state: SharedState,
    sensors: &'h mut S,
    clock: &'h mut C,

    idle_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("peer idle for longer than {0:?}")]
    IdleTimeout(Duration),
}

#[derive(Debug, Error)]
enum ParseError {
    #[error("expected an integer, got \"{0}\"")]
    ExpectedInteger(String),

    #[error("expected a number, got \"{0}\"")]
    ExpectedNumber(String),

    #[error(transparent)]
    Time(#[from] TimeParseError),
}

/// Whether the peer is still attached after a handler returns.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Flow {
    Continue,
    Ended,
}

impl<'h, T, S, C> Session<'h, T, S, C>
where
    T: AsyncRead + AsyncWrite,
    S: Sensors,
    C: Clock,
{
    pub fn new(
        stream: T,
        state: SharedState,
        sensors: &'h mut S,
        clock: &'h mut C,
        idle_timeout: Duration,
    ) -> Self {
        let (reader, writer) = split(stream);

        Self {
            reader: BufReader::new(reader),
            writer,
            state,
            sensors,
            clock,
            idle_timeout,
        }
    }

    /// Serves the peer until it disconnects, stalls past the idle timeout
    /// or the transport fails. A clean disconnect is not an error.
    pub async fn run(mut self) -> Result<(), SessionError> {
        loop {
            let code = match self.read_code().await? {
                Some(code) => code,
                None => return Ok(()),
            };

            let flow = match code {
                b'0' => self.telemetry_view().await?,
                b'1' => self.fan_menu().await?,
                b'2' => self.threshold_menu().await?,
                b'3' => self.schedule_menu().await?,
                b'4' => self.power_menu().await?,

                other => {
                    tracing::debug!(code = %(other as char), "Invalid top-level command");
                    self.send(format!("ERR command: invalid command '{}'", other as char))
                        .await?;
                    Flow::Continue
                }
            };

            if flow == Flow::Ended {
                return Ok(());
            }
        }
    }

    /* == Telemetry view == */

    /// Emits one telemetry frame per second until the peer sends `0`.
    async fn telemetry_view(&mut self) -> Result<Flow, SessionError> {
        loop {
            self.emit_telemetry().await?;

            // Pace the next frame on the exit-byte wait itself.
            match timeout(TELEMETRY_INTERVAL, self.reader.read_u8()).await {
                Err(_elapsed) => {}

                Ok(Ok(b'0')) => return Ok(Flow::Continue),
                Ok(Ok(_)) => {}

                Ok(Err(error)) if error.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(Flow::Ended);
                }

                Ok(Err(error)) => return Err(error.into()),
            }
        }
    }

    async fn emit_telemetry(&mut self) -> Result<(), SessionError> {
        let outputs = self.state.lock().await.control.outputs;

        self.send(outputs.recording_active as u8).await?;
        self.send(outputs.fan_active as u8).await?;

        match self.sensors.read_temperature().await {
            Ok(temperature) => self.send(format!("{temperature:.1}")).await?,
            Err(error) => self.send(format!("ERR sensor: {error}")).await?,
        }

        match self.clock.now().await {
            Ok(now) => self.send(now).await?,
            Err(error) => self.send(format!("ERR sensor: {error}")).await?,
        }

        match self.sensors.read_fan_tachometer().await {
            Ok(tachometer) => self.send(tachometer).await?,
            Err(error) => self.send(format!("ERR sensor: {error}")).await?,
        }

        Ok(())
    }

    /* == Fan speed menu == */

    async fn fan_menu(&mut self) -> Result<Flow, SessionError> {
        loop {
            match self.read_code().await? {
                None => return Ok(Flow::Ended),
                Some(b'0') => return Ok(Flow::Continue),

                Some(b'1') => {
                    if self.fan_speed_loop().await? == Flow::Ended {
                        return Ok(Flow::Ended);
                    }
                }

                Some(other) => self.invalid_option(other).await?,
            }
        }
    }

    async fn fan_speed_loop(&mut self) -> Result<Flow, SessionError> {
        loop {
            let speed = match self.read_code().await? {
                None => return Ok(Flow::Ended),
                Some(b'0') => return Ok(Flow::Continue),

                Some(b'1') => FanSpeed::Off,
                Some(b'2') => FanSpeed::Low,
                Some(b'3') => FanSpeed::Medium,
                Some(b'4') => FanSpeed::High,
                Some(b'5') => FanSpeed::Max,

                Some(other) => {
                    self.invalid_option(other).await?;
                    continue;
                }
            };

            self.state.lock().await.control.fan_speed = speed;
            self.send(format!("OK {speed}")).await?;
        }
    }

    /* == Temperature threshold menu == */

    async fn threshold_menu(&mut self) -> Result<Flow, SessionError> {
        let threshold = self.state.lock().await.control.fan_threshold();
        self.send(format!("{threshold:.1}")).await?;

        loop {
            match self.read_code().await? {
                None => return Ok(Flow::Ended),
                Some(b'0') => return Ok(Flow::Continue),

                Some(b'1') => match self.update_threshold().await? {
                    Flow::Continue => {}
                    Flow::Ended => return Ok(Flow::Ended),
                },

                Some(other) => self.invalid_option(other).await?,
            }
        }
    }

    async fn update_threshold(&mut self) -> Result<Flow, SessionError> {
        let line = match self.read_line().await? {
            Some(line) => line,
            None => return Ok(Flow::Ended),
        };

        let value = match parse_number(&line) {
            Ok(value) => value,
            Err(error) => {
                self.send(format!("ERR parse: {error}")).await?;
                return Ok(Flow::Continue);
            }
        };

        let applied = self.state.lock().await.control.set_fan_threshold(value);

        match applied {
            Ok(()) => self.send(format!("{value:.1}")).await?,
            Err(error) => self.send(format!("ERR control: {error}")).await?,
        }

        Ok(Flow::Continue)
    }

    /* == Time schedule menu == */

    async fn schedule_menu(&mut self) -> Result<Flow, SessionError> {
        loop {
            let flow = match self.read_code().await? {
                None => return Ok(Flow::Ended),
                Some(b'0') => return Ok(Flow::Continue),

                Some(b'1') => self.schedule_delete().await?,
                Some(b'2') => self.schedule_add().await?,
                Some(b'3') => self.schedule_change().await?,
                Some(b'4') => self.update_duration().await?,

                Some(other) => {
                    self.invalid_option(other).await?;
                    Flow::Continue
                }
            };

            if flow == Flow::Ended {
                return Ok(Flow::Ended);
            }
        }
    }

    async fn schedule_delete(&mut self) -> Result<Flow, SessionError> {
        let index = match self.read_index().await? {
            Ok(Some(index)) => index,
            Ok(None) => return Ok(Flow::Ended),
            Err(()) => return Ok(Flow::Continue),
        };

        let removed = self.state.lock().await.schedule.remove_at(index);

        match removed {
            Ok(entry) => self.send(format!("OK removed {entry}")).await?,
            Err(error) => self.send(format!("ERR schedule: {error}")).await?,
        }

        Ok(Flow::Continue)
    }

    async fn schedule_add(&mut self) -> Result<Flow, SessionError> {
        // The wire contract carries an index before the time text; entries
        // append regardless, so it is only validated as an integer.
        match self.read_index().await? {
            Ok(Some(_)) => {}
            Ok(None) => return Ok(Flow::Ended),
            Err(()) => return Ok(Flow::Continue),
        }

        let entry = match self.read_time().await? {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(Flow::Ended),
            Err(()) => return Ok(Flow::Continue),
        };

        let added = self.state.lock().await.schedule.add(entry);

        match added {
            Ok(()) => self.send(format!("OK added {entry}")).await?,
            Err(error) => self.send(format!("ERR schedule: {error}")).await?,
        }

        Ok(Flow::Continue)
    }

    async fn schedule_change(&mut self) -> Result<Flow, SessionError> {
        let index = match self.read_index().await? {
            Ok(Some(index)) => index,
            Ok(None) => return Ok(Flow::Ended),
            Err(()) => return Ok(Flow::Continue),
        };

        let entry = match self.read_time().await? {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(Flow::Ended),
            Err(()) => return Ok(Flow::Continue),
        };

        let updated = self.state.lock().await.schedule.update_at(index, entry);

        match updated {
            Ok(()) => self.send(format!("OK changed {index} to {entry}")).await?,
            Err(error) => self.send(format!("ERR schedule: {error}")).await?,
        }

        Ok(Flow::Continue)
    }

    async fn update_duration(&mut self) -> Result<Flow, SessionError> {
        let current = self.state.lock().await.control.on_duration();
        self.send(current).await?;

        let line = match self.read_line().await? {
            Some(line) => line,
            None => return Ok(Flow::Ended),
        };

        let minutes = match parse_u32(&line) {
            Ok(minutes) => minutes,
            Err(error) => {
                self.send(format!("ERR parse: {error}")).await?;
                return Ok(Flow::Continue);
            }
        };

        let applied = self.state.lock().await.control.set_on_duration(minutes);

        match applied {
            Ok(()) => self.send(minutes).await?,
            Err(error) => self.send(format!("ERR control: {error}")).await?,
        }

        Ok(Flow::Continue)
    }

    /* == Power override menu == */

    async fn power_menu(&mut self) -> Result<Flow, SessionError> {
        loop {
            let (recording, value) = match self.read_code().await? {
                None => return Ok(Flow::Ended),
                Some(b'0') => return Ok(Flow::Continue),

                Some(b'1') => (true, true),
                Some(b'2') => (true, false),
                Some(b'3') => (false, true),
                Some(b'4') => (false, false),

                Some(other) => {
                    self.invalid_option(other).await?;
                    continue;
                }
            };

            {
                let mut state = self.state.lock().await;

                match recording {
                    true => state.control.force_recording = value,
                    false => state.control.force_fan = value,
                }
            }

            self.send("OK").await?;
        }
    }

    /* == I/O helpers == */

    /// Reads the next command byte, skipping inter-command whitespace.
    /// `None` means the peer disconnected.
    async fn read_code(&mut self) -> Result<Option<u8>, SessionError> {
        loop {
            let read = timeout(self.idle_timeout, self.reader.read_u8())
                .await
                .map_err(|_| SessionError::IdleTimeout(self.idle_timeout))?;

            match read {
                Ok(byte) if byte.is_ascii_whitespace() => {}
                Ok(byte) => return Ok(Some(byte)),

                Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Reads one newline-terminated argument. `None` means disconnect.
    async fn read_line(&mut self) -> Result<Option<String>, SessionError> {
        let mut line = String::new();

        let read = timeout(self.idle_timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| SessionError::IdleTimeout(self.idle_timeout))??;

        match read {
            0 => Ok(None),
            _ => Ok(Some(line.trim().to_owned())),
        }
    }

    /// Outer `Result` is transport state, inner is parse success; a parse
    /// failure has already been reported to the peer.
    async fn read_index(&mut self) -> Result<Result<Option<usize>, ()>, SessionError> {
        let line = match self.read_line().await? {
            Some(line) => line,
            None => return Ok(Ok(None)),
        };

        match parse_integer(&line) {
            Ok(index) => Ok(Ok(Some(index))),
            Err(error) => {
                self.send(format!("ERR parse: {error}")).await?;
                Ok(Err(()))
            }
        }
    }

    async fn read_time(&mut self) -> Result<Result<Option<TimeOfDay>, ()>, SessionError> {
        let line = match self.read_line().await? {
            Some(line) => line,
            None => return Ok(Ok(None)),
        };

        match line.parse::<TimeOfDay>() {
            Ok(entry) => Ok(Ok(Some(entry))),
            Err(error) => {
                self.send(format!("ERR parse: {}", ParseError::Time(error)))
                    .await?;
                Ok(Err(()))
            }
        }
    }

    /// Writes carry the same timeout as reads; a peer that stops draining
    /// its socket must not pin the session slot forever.
    async fn send(&mut self, line: impl Display) -> Result<(), SessionError> {
        let text = format!("{line}\n");

        let write = async {
            self.writer.write_all(text.as_bytes()).await?;
            self.writer.flush().await
        };

        timeout(self.idle_timeout, write)
            .await
            .map_err(|_| SessionError::IdleTimeout(self.idle_timeout))??;

        Ok(())
    }

    async fn invalid_option(&mut self, code: u8) -> Result<(), SessionError> {
        self.send(format!("ERR command: invalid option '{}'", code as char))
            .await
    }
}

fn parse_integer(line: &str) -> Result<usize, ParseError> {
    line.parse()
        .map_err(|_| ParseError::ExpectedInteger(line.to_owned()))
}

fn parse_u32(line: &str) -> Result<u32, ParseError> {
    line.parse()
        .map_err(|_| ParseError::ExpectedInteger(line.to_owned()))
}

fn parse_number(line: &str) -> Result<f32, ParseError> {
    let value: f32 = line
        .parse()
        .map_err(|_| ParseError::ExpectedNumber(line.to_owned()))?;

    match value.is_finite() {
        true => Ok(value),
        false => Err(ParseError::ExpectedNumber(line.to_owned())),
    }
}
