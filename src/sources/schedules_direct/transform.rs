//! Airing to canonical programme transformation
//!
//! A pure function of the airing, its extended program info, the resolved
//! artwork and the station it airs on.

use std::collections::HashSet;

use chrono::Duration;

use super::api::{Airing, Artwork, EpisodeMetadata, Person, ProgramInfo, Station};
use crate::models::{
    Audio, Credit, Credits, EpisodeNumber, Icon, LangText, PreviouslyShown, Programme, Rating, Subtitle,
    Video,
};
use crate::utils::url::UrlUtils;

pub const SYSTEM_DD_PROGID: &str = "dd_progid";
pub const SYSTEM_XMLTV_NS: &str = "xmltv_ns";
pub const SYSTEM_SXXEXX: &str = "SxxExx";

/// Build the canonical programme for one airing on `channel_id`
pub fn transform_airing(
    channel_id: &str,
    airing: &Airing,
    program: &ProgramInfo,
    artwork: &[Artwork],
    station: &Station,
    image_base_url: &str,
) -> Programme {
    let start = airing.air_date_time;
    let mut programme = Programme::new(channel_id, airing.program_id.clone(), start);
    programme.stop = Some(start + Duration::seconds(airing.duration.max(0)));

    let language = station.broadcast_language.first().cloned();

    programme.titles = program
        .titles
        .iter()
        .filter(|t| !t.title120.is_empty())
        .map(|t| LangText::with_lang(t.title120.clone(), language.clone()))
        .collect();

    if let Some(episode_title) = program.episode_title150.as_deref().filter(|t| !t.is_empty()) {
        programme
            .secondary_titles
            .push(LangText::with_lang(episode_title, language.clone()));
    }

    programme.descriptions = descriptions(program);

    if let Some(lang) = language {
        programme.languages.push(LangText::new(lang));
    }

    programme.credits = credits(program.cast.iter().chain(program.crew.iter()));
    programme.date = production_date(program);
    programme.categories = categories(program);
    programme.keywords = keywords(program);
    programme.episode_numbers = episode_numbers(airing, program);
    programme.icons = icons(artwork, image_base_url);

    if !station.is_radio_station {
        programme.video = Some(video(&airing.video_properties));
    }

    let (audio, mut subtitles) = audio(&airing.audio_properties);
    programme.audio = audio;
    if airing.signed {
        subtitles.push(Subtitle {
            kind: "deaf-signed".to_string(),
        });
    }
    programme.subtitles = subtitles;

    programme.new = airing.new;
    if !airing.new {
        programme.previously_shown = Some(PreviouslyShown {
            start: program.original_air_date.as_deref().map(compact_date),
            channel: None,
        });
    }
    if airing.repeat {
        programme.previously_shown = None;
    }

    if let Some(marker) = airing.is_premiere_or_finale.as_deref() {
        let lower = marker.to_ascii_lowercase();
        if lower.contains("premiere") {
            programme.premiere = Some(LangText::new(marker));
        } else if lower.contains("finale") {
            programme.last_chance = Some(LangText::new(marker));
        }
    }
    if airing.premiere && programme.premiere.is_none() {
        programme.premiere = Some(LangText::default());
    }

    programme.ratings = ratings(program, airing);
    programme.star_ratings = star_ratings(program);

    programme
}

/// Format a program id as `EP01234567.0001`
pub fn dd_progid(program_id: &str) -> String {
    if program_id.len() == 14 && program_id.is_ascii() {
        format!("{}.{}", &program_id[..10], &program_id[10..])
    } else {
        program_id.to_string()
    }
}

fn descriptions(program: &ProgramInfo) -> Vec<LangText> {
    let preferred = if program.descriptions.description1000.is_empty() {
        &program.descriptions.description100
    } else {
        &program.descriptions.description1000
    };
    preferred
        .iter()
        .filter(|d| !d.description.is_empty())
        .map(|d| LangText::with_lang(d.description.clone(), d.description_language.clone()))
        .collect()
}

fn credits<'a>(people: impl Iterator<Item = &'a Person>) -> Credits {
    let mut credits = Credits::default();
    for person in people {
        let role = person.role.to_ascii_lowercase();
        let mut credit = Credit {
            name: person.name.clone(),
            role: String::new(),
            character: None,
        };
        if role.contains("director") {
            credits.directors.push(credit);
        } else if role.contains("actor") || role.contains("voice") {
            if person.role != "Actor" {
                credit.role = person.role.clone();
            }
            credit.character = person.character_name.clone().filter(|c| !c.is_empty());
            credits.actors.push(credit);
        } else if role.contains("writer") {
            credits.writers.push(credit);
        } else if role.contains("producer") {
            credits.producers.push(credit);
        } else if role.contains("host") || role.contains("anchor") {
            credits.presenters.push(credit);
        } else if role.contains("guest") || role.contains("contestant") {
            credits.guests.push(credit);
        }
    }
    credits
}

fn production_date(program: &ProgramInfo) -> Option<String> {
    program
        .movie
        .as_ref()
        .and_then(|m| m.year.clone())
        .filter(|y| !y.is_empty())
        .or_else(|| program.original_air_date.as_deref().map(compact_date))
}

fn compact_date(date: &str) -> String {
    date.replace('-', "")
}

fn categories(program: &ProgramInfo) -> Vec<LangText> {
    let mut seen = HashSet::new();
    let mut categories = Vec::new();
    for genre in &program.genres {
        if seen.insert(genre.clone()) {
            categories.push(LangText::new(genre.clone()));
        }
    }
    if !program.entity_type.is_empty() {
        let tag = if program.entity_type.eq_ignore_ascii_case("episode") {
            "Series".to_string()
        } else {
            program.entity_type.clone()
        };
        if seen.insert(tag.clone()) {
            categories.push(LangText::new(tag));
        }
    }
    categories
}

fn keywords(program: &ProgramInfo) -> Vec<LangText> {
    let mut seen = HashSet::new();
    program
        .keywords
        .values()
        .flatten()
        .map(|k| k.split_whitespace().collect::<Vec<_>>().join("-").to_lowercase())
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .map(LangText::new)
        .collect()
}

fn season_episode(program: &ProgramInfo) -> Option<&EpisodeMetadata> {
    program
        .metadata
        .iter()
        .flat_map(|entry| entry.values())
        .find(|meta| meta.season.is_some() || meta.episode.is_some())
}

fn zero_indexed(value: Option<u32>, total: Option<u32>) -> String {
    match value.filter(|v| *v > 0) {
        Some(v) => match total.filter(|t| *t > 0) {
            Some(t) => format!("{}/{}", v - 1, t),
            None => (v - 1).to_string(),
        },
        None => String::new(),
    }
}

fn episode_numbers(airing: &Airing, program: &ProgramInfo) -> Vec<EpisodeNumber> {
    let mut numbers = vec![EpisodeNumber {
        system: SYSTEM_DD_PROGID.to_string(),
        value: dd_progid(&program.program_id),
    }];

    if let Some(meta) = season_episode(program) {
        let season = zero_indexed(meta.season, meta.total_seasons);
        let episode = zero_indexed(meta.episode, meta.total_episodes);
        let part = match airing.multipart.as_ref().filter(|m| m.part_number > 0) {
            Some(m) if m.total_parts > 0 => format!("{}/{}", m.part_number - 1, m.total_parts),
            Some(m) => (m.part_number - 1).to_string(),
            None => "0".to_string(),
        };
        numbers.push(EpisodeNumber {
            system: SYSTEM_XMLTV_NS.to_string(),
            value: format!("{season}.{episode}.{part}"),
        });

        if let (Some(s), Some(e)) = (meta.season, meta.episode)
            && s > 0
            && e > 0
        {
            numbers.push(EpisodeNumber {
                system: SYSTEM_SXXEXX.to_string(),
                value: format!("S{s:02}E{e:02}"),
            });
        }
    }

    numbers
}

fn video(properties: &[String]) -> Video {
    let mut video = Video {
        present: true,
        ..Default::default()
    };
    for property in properties {
        match property.to_ascii_lowercase().as_str() {
            "hdtv" => {
                video.quality = Some("HDTV".to_string());
                video.aspect = Some("16:9".to_string());
            }
            "uhdtv" => video.quality = Some("UHD".to_string()),
            "sdtv" => video.aspect = Some("4:3".to_string()),
            _ => {}
        }
    }
    video
}

fn audio(properties: &[String]) -> (Option<Audio>, Vec<Subtitle>) {
    let mut audio: Option<Audio> = None;
    let mut subtitles = Vec::new();
    for property in properties {
        let stereo = match property.to_ascii_lowercase().as_str() {
            "mono" => "mono",
            "stereo" => "stereo",
            "dolby" => "dolby",
            "dd 5.1" => "dolby digital",
            "surround" => "surround",
            "sap" => "bilingual",
            "cc" | "subtitled" => {
                subtitles.push(Subtitle {
                    kind: "teletext".to_string(),
                });
                continue;
            }
            _ => continue,
        };
        audio = Some(Audio {
            present: true,
            stereo: Some(stereo.to_string()),
        });
    }
    (audio, subtitles)
}

fn ratings(program: &ProgramInfo, airing: &Airing) -> Vec<Rating> {
    let mut seen = HashSet::new();
    program
        .content_rating
        .iter()
        .map(|r| (&r.body, &r.code))
        .chain(airing.ratings.iter().map(|r| (&r.body, &r.code)))
        .filter(|(body, code)| !code.is_empty() && seen.insert((*body).clone()))
        .map(|(body, code)| Rating {
            value: code.clone(),
            system: Some(body.clone()).filter(|b| !b.is_empty()),
        })
        .collect()
}

fn star_ratings(program: &ProgramInfo) -> Vec<Rating> {
    program
        .movie
        .iter()
        .flat_map(|m| m.quality_rating.iter())
        .filter(|q| !q.rating.is_empty())
        .map(|q| Rating {
            value: format!("{}/{}", q.rating, q.max_rating),
            system: Some(q.ratings_body.clone()).filter(|b| !b.is_empty()),
        })
        .collect()
}

fn icons(artwork: &[Artwork], image_base_url: &str) -> Vec<Icon> {
    artwork
        .iter()
        .map(|a| Icon {
            src: UrlUtils::resolve(image_base_url, &a.uri),
            width: a.width,
            height: a.height,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::schedules_direct::api::{
        AiringRating, ContentRating, Movie, Multipart, ProgramDescription, ProgramTitle, QualityRating,
    };
    use chrono::{TimeZone, Utc};
    use rstest::rstest;
    use std::collections::BTreeMap;

    const IMAGE_BASE: &str = "https://json.schedulesdirect.org/20141201/image";

    fn airing() -> Airing {
        Airing {
            program_id: "EP012345670001".into(),
            air_date_time: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            duration: 1800,
            md5: "airing-md5".into(),
            new: false,
            repeat: false,
            premiere: false,
            signed: false,
            is_premiere_or_finale: None,
            live_tape_delay: None,
            ratings: Vec::new(),
            multipart: None,
            audio_properties: Vec::new(),
            video_properties: Vec::new(),
        }
    }

    fn program() -> ProgramInfo {
        ProgramInfo {
            program_id: "EP012345670001".into(),
            titles: vec![ProgramTitle {
                title120: "The Show".into(),
            }],
            entity_type: "Episode".into(),
            original_air_date: Some("2019-05-04".into()),
            ..Default::default()
        }
    }

    fn station() -> Station {
        Station {
            station_id: "10001".into(),
            broadcast_language: vec!["en".into(), "es".into()],
            ..Default::default()
        }
    }

    fn with_season_episode(season: Option<u32>, episode: Option<u32>) -> ProgramInfo {
        let mut meta = BTreeMap::new();
        meta.insert(
            "Gracenote".to_string(),
            EpisodeMetadata {
                season,
                episode,
                ..Default::default()
            },
        );
        ProgramInfo {
            metadata: vec![meta],
            ..program()
        }
    }

    fn run(airing: &Airing, program: &ProgramInfo, station: &Station) -> Programme {
        transform_airing("I4.10001.schedulesdirect.org", airing, program, &[], station, IMAGE_BASE)
    }

    #[test]
    fn test_season_one_episode_one() {
        let p = run(&airing(), &with_season_episode(Some(1), Some(1)), &station());
        assert_eq!(p.episode_number(SYSTEM_SXXEXX), Some("S01E01"));
        assert_eq!(p.episode_number(SYSTEM_XMLTV_NS), Some("0.0.0"));
        assert_eq!(p.episode_number(SYSTEM_DD_PROGID), Some("EP01234567.0001"));
    }

    #[test]
    fn test_episode_numbering_with_totals_and_parts() {
        let mut meta = BTreeMap::new();
        meta.insert(
            "Gracenote".to_string(),
            EpisodeMetadata {
                season: Some(3),
                episode: Some(7),
                total_seasons: Some(5),
                total_episodes: Some(10),
            },
        );
        let info = ProgramInfo {
            metadata: vec![meta],
            ..program()
        };
        let mut a = airing();
        a.multipart = Some(Multipart {
            part_number: 2,
            total_parts: 3,
        });
        let p = run(&a, &info, &station());
        assert_eq!(p.episode_number(SYSTEM_XMLTV_NS), Some("2/5.6/10.1/3"));
        assert_eq!(p.episode_number(SYSTEM_SXXEXX), Some("S03E07"));
    }

    #[test]
    fn test_without_season_metadata_only_progid_emitted() {
        let p = run(&airing(), &program(), &station());
        assert_eq!(p.episode_numbers.len(), 1);
        assert_eq!(p.episode_numbers[0].system, SYSTEM_DD_PROGID);
    }

    #[test]
    fn test_episode_only_metadata_skips_sxxexx() {
        let p = run(&airing(), &with_season_episode(None, Some(4)), &station());
        assert_eq!(p.episode_number(SYSTEM_XMLTV_NS), Some(".3.0"));
        assert_eq!(p.episode_number(SYSTEM_SXXEXX), None);
    }

    #[test]
    fn test_radio_station_never_gets_video() {
        let mut a = airing();
        a.video_properties = vec!["hdtv".into()];
        let radio = Station {
            is_radio_station: true,
            ..station()
        };
        assert!(run(&a, &program(), &radio).video.is_none());

        let tv = run(&a, &program(), &station());
        let video = tv.video.unwrap();
        assert_eq!(video.quality.as_deref(), Some("HDTV"));
        assert_eq!(video.aspect.as_deref(), Some("16:9"));
    }

    #[rstest]
    #[case(&["UHDTV"], Some("UHD"), None)]
    #[case(&["sdtv"], None, Some("4:3"))]
    #[case(&[], None, None)]
    fn test_video_properties(
        #[case] properties: &[&str],
        #[case] quality: Option<&str>,
        #[case] aspect: Option<&str>,
    ) {
        let mut a = airing();
        a.video_properties = properties.iter().map(|p| p.to_string()).collect();
        let video = run(&a, &program(), &station()).video.unwrap();
        assert!(video.present);
        assert_eq!(video.quality.as_deref(), quality);
        assert_eq!(video.aspect.as_deref(), aspect);
    }

    #[rstest]
    #[case("mono", "mono")]
    #[case("Stereo", "stereo")]
    #[case("DD 5.1", "dolby digital")]
    #[case("surround", "surround")]
    #[case("sap", "bilingual")]
    fn test_audio_mapping(#[case] property: &str, #[case] expected: &str) {
        let mut a = airing();
        a.audio_properties = vec![property.to_string()];
        let audio = run(&a, &program(), &station()).audio.unwrap();
        assert_eq!(audio.stereo.as_deref(), Some(expected));
    }

    #[test]
    fn test_captions_and_signing_add_subtitles() {
        let mut a = airing();
        a.audio_properties = vec!["cc".into(), "stereo".into()];
        a.signed = true;
        let p = run(&a, &program(), &station());
        let kinds: Vec<&str> = p.subtitles.iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(kinds, vec!["teletext", "deaf-signed"]);
        assert_eq!(p.audio.unwrap().stereo.as_deref(), Some("stereo"));
    }

    #[rstest]
    #[case(true, false, false)]
    #[case(false, true, false)]
    #[case(true, true, false)]
    #[case(false, false, true)]
    fn test_new_and_repeat_exclude_previously_shown(
        #[case] new: bool,
        #[case] repeat: bool,
        #[case] expect_previously_shown: bool,
    ) {
        let mut a = airing();
        a.new = new;
        a.repeat = repeat;
        let p = run(&a, &program(), &station());
        assert_eq!(p.previously_shown.is_some(), expect_previously_shown);
        if new {
            assert!(p.previously_shown.is_none());
        }
        if expect_previously_shown {
            assert_eq!(p.previously_shown.unwrap().start.as_deref(), Some("20190504"));
        }
    }

    #[test]
    fn test_titles_descriptions_and_language() {
        let mut info = program();
        info.episode_title150 = Some("Pilot".into());
        info.descriptions.description100 = vec![ProgramDescription {
            description_language: Some("en".into()),
            description: "Short".into(),
        }];
        let p = run(&airing(), &info, &station());
        assert_eq!(p.titles[0].lang.as_deref(), Some("en"));
        assert_eq!(p.secondary_titles[0].value, "Pilot");
        assert_eq!(p.descriptions[0].value, "Short");
        assert_eq!(p.languages, vec![LangText::new("en")]);

        info.descriptions.description1000 = vec![ProgramDescription {
            description_language: Some("en".into()),
            description: "A much longer description".into(),
        }];
        let p = run(&airing(), &info, &station());
        assert_eq!(p.descriptions.len(), 1);
        assert_eq!(p.descriptions[0].value, "A much longer description");
    }

    #[test]
    fn test_credit_buckets() {
        let person = |name: &str, role: &str| Person {
            name: name.into(),
            role: role.into(),
            character_name: None,
        };
        let mut info = program();
        info.cast = vec![
            Person {
                character_name: Some("Hero".into()),
                ..person("A", "Actor")
            },
            person("B", "Voice"),
            person("C", "Guest Star"),
            person("D", "Contestant"),
        ];
        info.crew = vec![
            person("E", "Director"),
            person("F", "Writer"),
            person("G", "Executive Producer"),
            person("H", "Host"),
            person("I", "Anchor"),
            person("J", "Assistant Director"),
            person("K", "Grip"),
        ];
        let credits = run(&airing(), &info, &station()).credits;
        fn names(bucket: &[Credit]) -> Vec<String> {
            bucket.iter().map(|c| c.name.clone()).collect()
        }
        assert_eq!(names(&credits.directors), vec!["E", "J"]);
        assert_eq!(names(&credits.actors), vec!["A", "B"]);
        assert_eq!(credits.actors[0].role, "");
        assert_eq!(credits.actors[0].character.as_deref(), Some("Hero"));
        assert_eq!(credits.actors[1].role, "Voice");
        assert_eq!(names(&credits.writers), vec!["F"]);
        assert_eq!(names(&credits.producers), vec!["G"]);
        assert_eq!(names(&credits.presenters), vec!["H", "I"]);
        assert_eq!(names(&credits.guests), vec!["C", "D"]);
    }

    #[test]
    fn test_categories_and_keywords() {
        let mut info = program();
        info.genres = vec!["Drama".into(), "Crime".into(), "Drama".into()];
        let mut keywords = BTreeMap::new();
        keywords.insert("Mood".to_string(), vec!["Dark Humor".to_string(), "Gritty".to_string()]);
        keywords.insert("Setting".to_string(), vec!["dark humor".to_string()]);
        info.keywords = keywords;
        let p = run(&airing(), &info, &station());
        let categories: Vec<&str> = p.categories.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(categories, vec!["Drama", "Crime", "Series"]);
        let keywords: Vec<&str> = p.keywords.iter().map(|k| k.value.as_str()).collect();
        assert_eq!(keywords, vec!["dark-humor", "gritty"]);

        info.entity_type = "Movie".into();
        let p = run(&airing(), &info, &station());
        assert_eq!(p.categories.last().unwrap().value, "Movie");
    }

    #[test]
    fn test_ratings_deduplicate_per_body() {
        let mut info = program();
        info.content_rating = vec![ContentRating {
            body: "USA Parental Rating".into(),
            code: "TV14".into(),
        }];
        info.movie = Some(Movie {
            year: Some("2001".into()),
            quality_rating: vec![QualityRating {
                ratings_body: "Gracenote".into(),
                rating: "3.5".into(),
                max_rating: "4".into(),
            }],
        });
        let mut a = airing();
        a.ratings = vec![
            AiringRating {
                body: "USA Parental Rating".into(),
                code: "TVMA".into(),
            },
            AiringRating {
                body: "Freiwillige Selbstkontrolle".into(),
                code: "12".into(),
            },
        ];
        let p = run(&a, &info, &station());
        let ratings: Vec<&str> = p.ratings.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(ratings, vec!["TV14", "12"]);
        assert_eq!(p.star_ratings[0].value, "3.5/4");
        assert_eq!(p.date.as_deref(), Some("2001"));
    }

    #[test]
    fn test_timing_premiere_and_icons() {
        let mut a = airing();
        a.is_premiere_or_finale = Some("Season Finale".into());
        let artwork = vec![Artwork {
            uri: "assets/p1.jpg".into(),
            width: Some(270),
            height: Some(360),
            ..Default::default()
        }];
        let p = transform_airing("chan", &a, &program(), &artwork, &station(), IMAGE_BASE);
        assert_eq!(p.stop.unwrap() - p.start, Duration::minutes(30));
        assert!(p.premiere.is_none());
        assert_eq!(p.last_chance.unwrap().value, "Season Finale");
        assert_eq!(p.icons[0].src, format!("{IMAGE_BASE}/assets/p1.jpg"));

        a.is_premiere_or_finale = None;
        a.premiere = true;
        let p = run(&a, &program(), &station());
        assert!(p.premiere.is_some());
    }
}
