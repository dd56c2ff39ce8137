//! Tuning, browsing and guide lookups.

use chrono::DateTime;
use chrono::Utc;
use std::time::Duration;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::CoordinatorInner;
use super::CoordinatorState;
use super::RecordingCoordinator;
use crate::domain::BrowseDirection;
use crate::domain::CardType;
use crate::domain::ChannelDirection;
use crate::domain::ChannelInfo;
use crate::domain::Lineup;
use crate::domain::PictureAttribute;
use crate::domain::ProgramInfo;
use crate::usecases::ports::CaptureChannelBox;
use crate::usecases::ports::CaptureError;

const PAUSE_TIMEOUT: Duration = Duration::from_secs(2);

fn tune(channel: &mut CaptureChannelBox, channum: &str) -> Result<(), CaptureError> {
    if !channel.is_open() {
        channel.open()?;
    }
    channel.set_channel_by_name(channum)
}

impl CoordinatorInner {
    pub(crate) fn load_lineup(&self) -> Option<Lineup> {
        match self.db.lineup() {
            Ok(lineup) => Some(lineup),
            Err(err) => {
                warn!(cardid = self.cardid, error = %err, "Channel lineup unavailable");
                None
            }
        }
    }

    pub(crate) fn channel_info_for(&self, channum: &str) -> Option<ChannelInfo> {
        if channum.is_empty() {
            return None;
        }
        let lineup = self.load_lineup()?;
        lineup
            .on_card(self.cardid, channum)
            .map(|(_, channel)| channel.clone())
    }

    /// Restores per-input channels and tunes the start channel.
    pub(crate) fn init_channel(&self, state: &mut CoordinatorState) {
        let Some(channel) = state.channel.as_mut() else {
            return;
        };
        if let Err(err) = channel.open() {
            warn!(cardid = self.cardid, error = %err, "Channel unavailable at startup");
            return;
        }

        let remembered = match self.db.input_channels(self.cardid) {
            Ok(map) => map,
            Err(err) => {
                warn!(cardid = self.cardid, error = %err, "Failed to load input channels");
                Default::default()
            }
        };
        let input = self.device.default_input.as_str();
        let start = remembered
            .get(input)
            .filter(|channum| !channum.is_empty())
            .cloned()
            .unwrap_or_else(|| self.device.start_channel.clone());
        if !remembered.is_empty() {
            channel.set_input_channels(remembered);
        }

        let tuned = if !input.is_empty() {
            channel.switch_to_input(input, &start)
        } else if !start.is_empty() {
            channel.set_channel_by_name(&start)
        } else {
            Ok(())
        };
        match tuned {
            Ok(()) => debug!(cardid = self.cardid, input, channum = %start, "Start channel tuned"),
            Err(err) => warn!(cardid = self.cardid, error = %err, "Failed to tune start channel"),
        }
        channel.set_channel_ordering(self.settings.channel_ordering());
        self.close_channel(state);
    }

    /// DVB channels stay open unless they are opened on demand.
    pub(crate) fn close_channel(&self, state: &mut CoordinatorState) {
        if self.card_type == CardType::Dvb && !self.device.dvb.dvb_on_demand {
            return;
        }
        if let Some(channel) = state.channel.as_mut() {
            if channel.is_open() {
                channel.close();
            }
        }
    }

    pub(crate) fn prepare_channel_for_recorder(&self, state: &mut CoordinatorState) {
        let Some(channel) = state.channel.as_mut() else {
            return;
        };
        if !channel.is_open() {
            if let Err(err) = channel.open() {
                warn!(cardid = self.cardid, error = %err, "Failed to open channel for recorder");
                return;
            }
        }
        if self.card_type == CardType::Dvb && self.device.dvb.dvb_on_demand {
            let channum = channel.current_channel();
            if !channum.is_empty() {
                if let Err(err) = channel.set_channel_by_name(&channum) {
                    warn!(cardid = self.cardid, error = %err, "Failed to retune channel");
                }
            }
        }
        channel.apply_picture_settings();
    }

    /// Tunes the input and channel a scheduled recording asks for.
    pub(crate) fn tune_for_recording(&self, state: &mut CoordinatorState) -> Result<(), CaptureError> {
        let Some(current) = state.current.as_ref() else {
            return Ok(());
        };
        let channum = current.info.chanstr.clone();
        let sourceid = current.info.sourceid;
        let Some(channel) = state.channel.as_mut() else {
            return Ok(());
        };
        if channum.is_empty() {
            return Ok(());
        }
        if !channel.is_open() {
            channel.open()?;
        }

        let input = self.load_lineup().and_then(|lineup| {
            lineup
                .input_for_source(self.cardid, sourceid)
                .map(|input| input.name.clone())
        });
        match input {
            Some(input) if input != channel.current_input() => {
                info!(cardid = self.cardid, input = %input, channum = %channum, "Switching input for recording");
                channel.switch_to_input(&input, &channum)
            }
            _ => channel.set_channel_by_name(&channum),
        }
    }

    /// Persists the channel last tuned on every input.
    pub(crate) fn store_input_channels(&self, state: &CoordinatorState) {
        let Some(channel) = state.channel.as_ref() else {
            return;
        };
        let mut channels = channel.input_channels();
        let input = channel.current_input();
        let channum = channel.current_channel();
        if !input.is_empty() && !channum.is_empty() {
            channels.insert(input, channum);
        }
        for (input, channum) in channels {
            if let Err(err) = self.db.store_input_channel(self.cardid, &input, &channum) {
                warn!(cardid = self.cardid, input = %input, error = %err, "Failed to store input channel");
            }
        }
    }

    /// Holds the recorder and discards buffered data ahead of a retune.
    fn pause(&self, state: &mut CoordinatorState) {
        if let Some(active) = state.recorder.as_ref() {
            let recorder = &active.recorder;
            if !recorder.is_paused() {
                recorder.pause(true);
            }
            if !recorder.wait_for_pause(PAUSE_TIMEOUT) {
                warn!(cardid = self.cardid, "Recorder did not pause in time");
            }
        }
        let _data = self.lock_data();
        if let Some(sink) = state.sink.as_ref() {
            sink.stop_reads();
            sink.reset();
        }
    }

    fn unpause(&self, state: &mut CoordinatorState) {
        let channum = state
            .channel
            .as_ref()
            .map(|channel| channel.current_channel())
            .unwrap_or_default();
        if let Some(active) = state.recorder.as_ref() {
            active.recorder.set_channel_name(&channum);
            active.recorder.reset();
            active.recorder.unpause();
        }
        if let Some(sink) = state.sink.as_ref() {
            sink.start_reads();
        }
    }

    fn current_position(state: &CoordinatorState) -> (String, String) {
        state
            .channel
            .as_ref()
            .map(|channel| (channel.current_input(), channel.current_channel()))
            .unwrap_or_default()
    }
}

impl RecordingCoordinator {
    /// Pauses the recorder; the next channel change resumes it.
    pub fn pause_recorder(&self) {
        let mut state = self.inner.lock();
        self.inner.pause(&mut state);
    }

    pub fn toggle_inputs(&self) -> bool {
        let inner = &self.inner;
        let mut state = inner.lock();
        if state.channel.is_none() {
            return false;
        }
        inner.pause(&mut state);
        let result = match state.channel.as_mut() {
            Some(channel) => {
                let opened = if channel.is_open() { Ok(()) } else { channel.open() };
                opened.and_then(|()| channel.toggle_inputs())
            }
            None => Ok(()),
        };
        inner.unpause(&mut state);
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(cardid = inner.cardid, error = %err, "Failed to toggle inputs");
                false
            }
        }
    }

    /// Tunes `name`, retuning the previous channel when it fails.
    pub fn set_channel(&self, name: &str) -> bool {
        let inner = &self.inner;
        let name = name.trim();
        let mut state = inner.lock();
        let Some(previous) = state.channel.as_ref().map(|c| c.current_channel()) else {
            warn!(cardid = inner.cardid, "No channel to tune");
            return false;
        };

        inner.pause(&mut state);
        let mut tuned = true;
        if let Some(channel) = state.channel.as_mut() {
            if let Err(err) = tune(channel, name) {
                warn!(cardid = inner.cardid, channum = %name, error = %err, "Failed to tune channel");
                tuned = false;
                if !previous.is_empty() {
                    if let Err(err) = tune(channel, &previous) {
                        warn!(cardid = inner.cardid, channum = %previous, error = %err, "Failed to restore channel");
                    }
                }
            }
        }
        inner.unpause(&mut state);
        tuned
    }

    pub fn change_channel(&self, direction: ChannelDirection) -> bool {
        let next = self.next_channel(direction);
        if next.is_empty() {
            warn!(cardid = self.inner.cardid, ?direction, "No channel to change to");
            return false;
        }
        self.set_channel(&next)
    }

    pub fn toggle_channel_favorite(&self) -> bool {
        let inner = &self.inner;
        let state = inner.lock();
        let (input, channum) = CoordinatorInner::current_position(&state);
        drop(state);
        let Some(lineup) = inner.load_lineup() else {
            return false;
        };
        let channel = lineup
            .on_input(inner.cardid, &input, &channum)
            .or_else(|| lineup.on_card(inner.cardid, &channum).map(|(_, c)| c));
        let Some(channel) = channel else {
            warn!(cardid = inner.cardid, channum = %channum, "Current channel not in lineup");
            return false;
        };
        match inner.db.set_favorite(&channel.chanid, !channel.favorite) {
            Ok(()) => true,
            Err(err) => {
                warn!(cardid = inner.cardid, error = %err, "Failed to toggle favorite");
                false
            }
        }
    }

    /// New value of the attribute, -1 without a channel.
    pub fn change_picture(&self, attr: PictureAttribute, up: bool) -> i32 {
        let mut state = self.inner.lock();
        state
            .channel
            .as_mut()
            .and_then(|channel| channel.change_picture_attribute(attr, up))
            .unwrap_or(-1)
    }

    /// Whether `name` can be tuned: current input, then any input of the
    /// card, then an empty lineup.
    pub fn check_channel(&self, name: &str) -> bool {
        let inner = &self.inner;
        let (input, _) = CoordinatorInner::current_position(&inner.lock());
        let lineup = match inner.db.lineup() {
            Ok(lineup) => lineup,
            Err(err) => {
                warn!(cardid = inner.cardid, error = %err, "Cannot check channel, allowing it");
                return true;
            }
        };
        if lineup.on_input(inner.cardid, &input, name).is_some() {
            return true;
        }
        if lineup.on_card(inner.cardid, name).is_some() {
            debug!(cardid = inner.cardid, channum = %name, "Channel found on another input");
            return true;
        }
        lineup.is_empty()
    }

    /// `(matches, unique)` for a partly typed channel number.
    pub fn check_channel_prefix(&self, prefix: &str) -> (bool, bool) {
        let inner = &self.inner;
        let (input, _) = CoordinatorInner::current_position(&inner.lock());
        let Some(lineup) = inner.load_lineup() else {
            return (true, false);
        };
        if lineup.is_empty() {
            return (true, true);
        }
        let matches = lineup.prefix_matches(inner.cardid, &input, prefix);
        match matches.as_slice() {
            [] => (false, false),
            [only] => (true, only.channum == prefix),
            _ => (true, false),
        }
    }

    /// True when the channel is only receivable on another card.
    pub fn should_switch_to_another_card(&self, chanid: &str) -> bool {
        let Some(lineup) = self.inner.load_lineup() else {
            return false;
        };
        let Some(channel) = lineup.find(chanid) else {
            return false;
        };
        if lineup.carried_by(self.inner.cardid, channel) {
            return false;
        }
        lineup.carried_elsewhere(self.inner.cardid, channel)
    }

    fn next_channel_info(&self, direction: ChannelDirection) -> Option<ChannelInfo> {
        let (_, current) = CoordinatorInner::current_position(&self.inner.lock());
        let lineup = self.inner.load_lineup()?;
        lineup
            .next_channel(self.inner.cardid, &current, self.inner.ordering, direction)
            .cloned()
    }

    /// Channel number reached by browsing, empty when there is none.
    pub fn next_channel(&self, direction: ChannelDirection) -> String {
        self.next_channel_info(direction)
            .map(|channel| channel.channum)
            .unwrap_or_default()
    }

    pub fn next_chanid(&self, direction: ChannelDirection) -> String {
        self.next_channel_info(direction)
            .map(|channel| channel.chanid)
            .unwrap_or_default()
    }

    pub fn input_name(&self) -> String {
        CoordinatorInner::current_position(&self.inner.lock()).0
    }

    /// Program airing now on the current channel, or the channel alone.
    pub fn channel_info(&self) -> Option<ProgramInfo> {
        let inner = &self.inner;
        let (input, channum) = CoordinatorInner::current_position(&inner.lock());
        if channum.is_empty() {
            return None;
        }
        let lineup = inner.load_lineup()?;
        let channel = lineup
            .on_input(inner.cardid, &input, &channum)
            .or_else(|| lineup.on_card(inner.cardid, &channum).map(|(_, c)| c))?;
        let now = inner.clock.now();
        let program = guide(inner, channel).into_iter().find(|p| p.airs_at(now));
        Some(with_channel(program, channel))
    }

    /// Guide browsing step from `channum`/`chanid` at `start`.
    pub fn next_program(
        &self,
        direction: BrowseDirection,
        channum: &str,
        chanid: &str,
        start: DateTime<Utc>,
    ) -> Option<ProgramInfo> {
        let inner = &self.inner;
        let lineup = inner.load_lineup()?;
        let here = lineup
            .find(chanid)
            .or_else(|| lineup.on_card(inner.cardid, channum).map(|(_, c)| c));

        let channel = match direction.channel_direction() {
            Some(ChannelDirection::Same) | None => here?,
            Some(step) => {
                let anchor = here.map_or(channum, |c| c.channum.as_str());
                lineup.next_channel(inner.cardid, anchor, inner.ordering, step)?
            }
        };

        let rows = guide(inner, channel);
        let program = match direction {
            BrowseDirection::Left => rows
                .into_iter()
                .rev()
                .find(|p| p.end.is_some_and(|end| end <= start)),
            BrowseDirection::Right => rows
                .into_iter()
                .find(|p| p.start.is_some_and(|s| s > start)),
            _ => rows.into_iter().find(|p| p.airs_at(start)),
        };
        Some(with_channel(program, channel))
    }
}

/// Guide rows of a channel, oldest first.
fn guide(inner: &CoordinatorInner, channel: &ChannelInfo) -> Vec<ProgramInfo> {
    match inner.db.programs(&channel.chanid) {
        Ok(programs) => programs,
        Err(err) => {
            warn!(cardid = inner.cardid, chanid = %channel.chanid, error = %err, "Guide unavailable");
            Vec::new()
        }
    }
}

fn with_channel(program: Option<ProgramInfo>, channel: &ChannelInfo) -> ProgramInfo {
    program
        .map(|program| program.with_channel(channel))
        .unwrap_or_else(|| ProgramInfo::from_channel(channel))
}
