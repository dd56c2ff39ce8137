use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::domain::channel::ChannelDirection;
use crate::domain::channel::ChannelInfo;
use crate::domain::channel::ChannelOrdering;
use crate::domain::channel::InputInfo;

/// Snapshot of every card input and channel known to the store, with the
/// lookups a capture device needs.
#[derive(Debug, Clone, Default)]
pub struct Lineup {
    inputs: Vec<InputInfo>,
    channels: Vec<ChannelInfo>,
}

impl Lineup {
    pub fn new(inputs: Vec<InputInfo>, channels: Vec<ChannelInfo>) -> Self {
        Self { inputs, channels }
    }

    /// The store holds no channels at all.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    pub fn find(&self, chanid: &str) -> Option<&ChannelInfo> {
        self.channels.iter().find(|c| c.chanid == chanid)
    }

    pub fn inputs_of(&self, cardid: u32) -> impl Iterator<Item = &InputInfo> {
        self.inputs.iter().filter(move |i| i.cardid == cardid)
    }

    pub fn input_for_source(&self, cardid: u32, sourceid: u32) -> Option<&InputInfo> {
        self.inputs_of(cardid).find(|i| i.sourceid == sourceid)
    }

    fn sources_of(&self, cardid: u32) -> BTreeSet<u32> {
        self.inputs_of(cardid).map(|i| i.sourceid).collect()
    }

    /// Channel `channum` reachable through the named input.
    pub fn on_input(&self, cardid: u32, input: &str, channum: &str) -> Option<&ChannelInfo> {
        let input = self.inputs_of(cardid).find(|i| i.name == input)?;
        self.channels
            .iter()
            .find(|c| c.sourceid == input.sourceid && c.channum == channum)
    }

    /// Channel `channum` on any input of the card.
    pub fn on_card(&self, cardid: u32, channum: &str) -> Option<(&InputInfo, &ChannelInfo)> {
        self.inputs_of(cardid).find_map(|input| {
            self.channels
                .iter()
                .find(|c| c.sourceid == input.sourceid && c.channum == channum)
                .map(|channel| (input, channel))
        })
    }

    /// Channels of every source wired to the card, without duplicates.
    pub fn card_channels(&self, cardid: u32) -> Vec<&ChannelInfo> {
        let sources = self.sources_of(cardid);
        let mut seen = BTreeSet::new();
        self.channels
            .iter()
            .filter(|c| sources.contains(&c.sourceid))
            .filter(|c| seen.insert(c.chanid.clone()))
            .collect()
    }

    /// Channels on the input whose number starts with `prefix`.
    pub fn prefix_matches(&self, cardid: u32, input: &str, prefix: &str) -> Vec<&ChannelInfo> {
        let Some(input) = self.inputs_of(cardid).find(|i| i.name == input) else {
            return Vec::new();
        };
        self.channels
            .iter()
            .filter(|c| c.sourceid == input.sourceid && c.channum.starts_with(prefix))
            .collect()
    }

    fn same_station<'a>(&'a self, channel: &'a ChannelInfo) -> impl Iterator<Item = &'a ChannelInfo> {
        self.channels.iter().filter(move |c| {
            c.chanid == channel.chanid
                || (c.channum == channel.channum && c.callsign == channel.callsign)
        })
    }

    /// The station, by id or by number and callsign, is receivable on the card.
    pub fn carried_by(&self, cardid: u32, channel: &ChannelInfo) -> bool {
        let sources = self.sources_of(cardid);
        self.same_station(channel)
            .any(|c| sources.contains(&c.sourceid))
    }

    /// The station is receivable on some card other than `cardid`.
    pub fn carried_elsewhere(&self, cardid: u32, channel: &ChannelInfo) -> bool {
        let other_sources: BTreeSet<u32> = self
            .inputs
            .iter()
            .filter(|i| i.cardid != cardid)
            .map(|i| i.sourceid)
            .collect();
        self.same_station(channel)
            .any(|c| other_sources.contains(&c.sourceid))
    }

    /// Circular browsing over the card's visible channels.
    ///
    /// Numeric ordering of a channel number that starts with a letter falls
    /// back to lexical ordering. An unknown `current` starts at the first
    /// channel.
    pub fn next_channel(
        &self,
        cardid: u32,
        current: &str,
        ordering: ChannelOrdering,
        direction: ChannelDirection,
    ) -> Option<&ChannelInfo> {
        let ordering = if ordering == ChannelOrdering::Numeric
            && current.chars().next().is_some_and(char::is_alphabetic)
        {
            ChannelOrdering::Channum
        } else {
            ordering
        };

        let mut channels: Vec<&ChannelInfo> = self
            .card_channels(cardid)
            .into_iter()
            .filter(|c| c.visible)
            .collect();
        channels.sort_by(|a, b| ordering.compare(a, b));

        let first = *channels.first()?;
        let anchor = channels
            .iter()
            .copied()
            .find(|c| c.channum == current)
            .unwrap_or(first);

        match direction {
            ChannelDirection::Same => Some(anchor),
            ChannelDirection::Up => first_after(&channels, anchor, ordering),
            ChannelDirection::Down => channels
                .iter()
                .rev()
                .copied()
                .find(|c| ordering.compare(c, anchor) == Ordering::Less)
                .or_else(|| channels.last().copied()),
            ChannelDirection::Favorite => {
                let favorites: Vec<&ChannelInfo> =
                    channels.iter().copied().filter(|c| c.favorite).collect();
                first_after(&favorites, anchor, ordering)
            }
        }
    }
}

fn first_after<'a>(
    list: &[&'a ChannelInfo],
    anchor: &ChannelInfo,
    ordering: ChannelOrdering,
) -> Option<&'a ChannelInfo> {
    list.iter()
        .copied()
        .find(|c| ordering.compare(c, anchor) == Ordering::Greater)
        .or_else(|| list.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(cardid: u32, name: &str, sourceid: u32) -> InputInfo {
        InputInfo {
            cardid,
            name: name.to_string(),
            sourceid,
            start_channel: String::new(),
        }
    }

    fn channel(chanid: &str, channum: &str, sourceid: u32) -> ChannelInfo {
        let mut c = ChannelInfo::new(chanid, channum, sourceid);
        c.callsign = format!("CALL{channum}");
        c
    }

    fn lineup() -> Lineup {
        let mut fav = channel("1005", "5", 1);
        fav.favorite = true;
        let mut hidden = channel("1007", "7", 1);
        hidden.visible = false;
        let mut fav_high = channel("1012", "12", 1);
        fav_high.favorite = true;
        Lineup::new(
            vec![
                input(1, "Tuner 1", 1),
                input(1, "Composite", 2),
                input(2, "Tuner 1", 3),
            ],
            vec![
                channel("1002", "2", 1),
                fav,
                hidden,
                fav_high,
                channel("1036", "36", 1),
                channel("1360", "360", 1),
                channel("2003", "3", 2),
                channel("3009", "9", 3),
            ],
        )
    }

    #[test]
    fn test_on_input_and_on_card() {
        let lineup = lineup();
        assert!(lineup.on_input(1, "Tuner 1", "5").is_some());
        assert!(lineup.on_input(1, "Tuner 1", "3").is_none());
        let (input, channel) = lineup.on_card(1, "3").unwrap();
        assert_eq!(input.name, "Composite");
        assert_eq!(channel.chanid, "2003");
        assert!(lineup.on_card(1, "9").is_none());
    }

    #[test]
    fn test_prefix_matches_current_input_only() {
        let lineup = lineup();
        let matches = lineup.prefix_matches(1, "Tuner 1", "36");
        assert_eq!(matches.len(), 2);
        assert_eq!(lineup.prefix_matches(1, "Tuner 1", "360").len(), 1);
        assert!(lineup.prefix_matches(1, "Tuner 1", "3").len() == 2);
        assert!(lineup.prefix_matches(1, "Missing", "3").is_empty());
    }

    #[test]
    fn test_carried_by_and_elsewhere() {
        let lineup = lineup();
        let other = lineup.find("3009").unwrap().clone();
        assert!(!lineup.carried_by(1, &other));
        assert!(lineup.carried_elsewhere(1, &other));

        let own = lineup.find("1002").unwrap().clone();
        assert!(lineup.carried_by(1, &own));
    }

    #[test]
    fn test_next_channel_up_wraps_around() {
        let lineup = lineup();
        let next = |current: &str, dir| {
            lineup
                .next_channel(1, current, ChannelOrdering::Numeric, dir)
                .map(|c| c.channum.clone())
        };
        assert_eq!(next("2", ChannelDirection::Up).as_deref(), Some("3"));
        assert_eq!(next("5", ChannelDirection::Up).as_deref(), Some("12"));
        assert_eq!(next("360", ChannelDirection::Up).as_deref(), Some("2"));
        assert_eq!(next("2", ChannelDirection::Down).as_deref(), Some("360"));
        assert_eq!(next("12", ChannelDirection::Down).as_deref(), Some("5"));
        assert_eq!(next("12", ChannelDirection::Same).as_deref(), Some("12"));
    }

    #[test]
    fn test_next_channel_unknown_current_starts_at_first() {
        let lineup = lineup();
        let same = lineup.next_channel(1, "999x", ChannelOrdering::Numeric, ChannelDirection::Same);
        assert_eq!(same.unwrap().channum, "2");
        let up = lineup.next_channel(1, "", ChannelOrdering::Numeric, ChannelDirection::Up);
        assert_eq!(up.unwrap().channum, "3");
    }

    #[test]
    fn test_next_channel_favorites_only() {
        let lineup = lineup();
        let fav = |current: &str| {
            lineup
                .next_channel(1, current, ChannelOrdering::Numeric, ChannelDirection::Favorite)
                .map(|c| c.channum.clone())
        };
        assert_eq!(fav("2").as_deref(), Some("5"));
        assert_eq!(fav("5").as_deref(), Some("12"));
        assert_eq!(fav("12").as_deref(), Some("5"));
    }

    #[test]
    fn test_next_channel_skips_hidden() {
        let lineup = lineup();
        let up = lineup.next_channel(1, "5", ChannelOrdering::Numeric, ChannelDirection::Up);
        assert_ne!(up.unwrap().channum, "7");
    }

    #[test]
    fn test_letter_channel_falls_back_to_lexical_order() {
        let lineup = Lineup::new(
            vec![input(1, "Tuner 1", 1)],
            vec![
                channel("1", "A1", 1),
                channel("2", "B2", 1),
                channel("3", "C3", 1),
            ],
        );
        let up = lineup.next_channel(1, "A1", ChannelOrdering::Numeric, ChannelDirection::Up);
        assert_eq!(up.unwrap().channum, "B2");
        let down = lineup.next_channel(1, "A1", ChannelOrdering::Numeric, ChannelDirection::Down);
        assert_eq!(down.unwrap().channum, "C3");
    }

    #[test]
    fn test_empty_card_has_no_next_channel() {
        let lineup = Lineup::new(vec![input(5, "Tuner", 9)], Vec::new());
        assert!(lineup.is_empty());
        assert!(
            lineup
                .next_channel(5, "1", ChannelOrdering::Numeric, ChannelDirection::Up)
                .is_none()
        );
    }
}
