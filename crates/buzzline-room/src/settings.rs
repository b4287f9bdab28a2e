//! Settings validation.
//!
//! Settings arrive from clients as loosely-typed JSON, so every numeric
//! field is checked here before a room will accept it. Validation is
//! all-or-nothing: either every field is acceptable and the whole value
//! replaces the room's settings, or nothing changes.

use buzzline_protocol::GameSettings;

use crate::RoomError;

/// Upper bound for `maxPlayers`.
pub const MAX_PLAYERS_LIMIT: i64 = 64;
/// Upper bound for `roundDuration`, in seconds.
pub const MAX_ROUND_DURATION_SECS: i64 = 600;
/// Upper bound for `numRounds`.
pub const MAX_ROUNDS: i64 = 100;
/// Upper bound for `teamSize`.
pub const MAX_TEAM_SIZE: i64 = 32;
/// Upper bound for `numTeams`.
pub const MAX_TEAMS: i64 = 16;
/// Upper bound for `restTimeBetweenRounds`, in seconds.
pub const MAX_REST_SECS: i64 = 300;

/// Checks a proposed settings value for a room with `member_count`
/// members. All problems are reported together.
pub fn validate(proposed: &GameSettings, member_count: usize) -> Result<(), RoomError> {
    let mut problems = Vec::new();

    check_range(&mut problems, "maxPlayers", proposed.max_players, 1, MAX_PLAYERS_LIMIT);
    check_range(
        &mut problems,
        "roundDuration",
        proposed.round_duration_secs,
        1,
        MAX_ROUND_DURATION_SECS,
    );
    check_range(&mut problems, "numRounds", proposed.num_rounds, 1, MAX_ROUNDS);
    check_range(
        &mut problems,
        "restTimeBetweenRounds",
        proposed.rest_time_secs,
        0,
        MAX_REST_SECS,
    );

    check_range(&mut problems, "teamSize", proposed.team_size, 1, MAX_TEAM_SIZE);
    let min_teams = if proposed.teams_enabled { 1 } else { 0 };
    check_range(&mut problems, "numTeams", proposed.num_teams, min_teams, MAX_TEAMS);

    if proposed.max_players >= 1 && (proposed.max_players as u64) < member_count as u64 {
        problems.push(format!(
            "maxPlayers {} is below the {} members already in the room",
            proposed.max_players, member_count
        ));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(RoomError::InvalidSettings(problems.join("; ")))
    }
}

/// Checks that `participants` players fit into the configured teams.
///
/// No-op when teams are disabled.
pub fn check_team_capacity(settings: &GameSettings, participants: usize) -> Result<(), RoomError> {
    if !settings.teams_enabled {
        return Ok(());
    }
    let capacity = settings.team_size.max(0) as u64 * settings.num_teams.max(0) as u64;
    if participants as u64 > capacity {
        return Err(RoomError::InvalidSettings(format!(
            "{participants} participants do not fit in {} teams of {}",
            settings.num_teams, settings.team_size
        )));
    }
    Ok(())
}

fn check_range(problems: &mut Vec<String>, field: &str, value: i64, min: i64, max: i64) {
    if value < min || value > max {
        problems.push(format!("{field} must be between {min} and {max}, got {value}"));
    }
}
