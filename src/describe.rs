use crate::coverage::CoverageReport;
use crate::mapping::MappingEvent;
use crate::model::{Entity, EntityType};
use crate::phase::{MappingPhase, PhaseProgress};
use crate::session::MappingSession;

/// Human-readable summary of a session: phase progress, coverage, sacrifices.
pub fn describe_session(session: &mut MappingSession) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "Session: {}",
        if session.label().is_empty() {
            "(untitled)"
        } else {
            session.label()
        }
    ));
    lines.push(format!(
        "Sources: {}  Destinations: {}  Mapped: {}  Skipped: {}",
        session.sources().len(),
        session.dests().len(),
        session.state().assignment_count(),
        session.state().skipped().count()
    ));

    let current = session.phase();
    lines.push("\nPhases".to_string());
    for progress in session.phase_progress() {
        lines.push(describe_phase_line(&progress, current));
    }

    let report = session.coverage_report();
    lines.push(String::new());
    lines.extend(describe_coverage(&report));

    let remaining = session.remaining();
    if !remaining.is_empty() {
        lines.push(format!("\nUnresolved in {current} ({})", remaining.len()));
        for name in remaining {
            lines.push(format!("  - {name}"));
        }
    }

    let sacrifices = session.sacrifices();
    if !sacrifices.is_empty() {
        lines.push(format!("\nSacrificed ({})", sacrifices.len()));
        for s in sacrifices {
            lines.push(format!(
                "  - {} wanted {} ({:.2}) held by {}; has {} ({:.2})",
                s.source,
                s.best_match,
                s.best_score,
                s.best_went_to,
                s.assigned_to.as_deref().unwrap_or("nothing"),
                s.assigned_score
            ));
        }
    }

    lines.join("\n")
}

fn describe_phase_line(p: &PhaseProgress, current: MappingPhase) -> String {
    let marker = if p.phase == current { ">" } else { " " };
    format!(
        " {marker} {:<12} {}/{} ({:.0}%)",
        p.phase.to_string(),
        p.completed,
        p.total,
        p.percent
    )
}

pub fn describe_coverage(report: &CoverageReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Display coverage: {}% ({}/{} destinations, {:+.1} since auto-match)",
            report.snapshot.display_rounded(),
            report.snapshot.covered_dest_count,
            report.snapshot.total_dest_count,
            report.gain.display
        ),
        format!(
            "Effects coverage: {}% ({}/{} effects, {:+.1} since auto-match)",
            report.snapshot.effects_rounded(),
            report.snapshot.covered_effect_count,
            report.snapshot.total_effect_count,
            report.gain.effects
        ),
    ];
    for items in &report.items {
        lines.push(format!("  {:?}: {}/{} mapped", items.bucket, items.mapped, items.total));
    }
    for t in report.effect_types.iter().filter(|t| t.signature) {
        lines.push(format!("  {} (signature): {}/{}", t.effect_type, t.covered, t.total));
    }
    lines
}

/// Layout listing for the classifier view: one line per entity with its type.
pub fn describe_entities(entities: &[Entity]) -> String {
    let mut lines = Vec::new();
    for entity_type in EntityType::ALL {
        let of_type: Vec<&Entity> = entities.iter().filter(|e| e.entity_type() == entity_type).collect();
        if of_type.is_empty() {
            continue;
        }
        lines.push(format!("{} ({})", entity_type.label(), of_type.len()));
        for e in of_type {
            if e.is_group() {
                lines.push(format!("  - {} ({} members)", e.name(), e.member_names().len()));
            } else {
                lines.push(format!("  - {} ({} nodes)", e.name(), e.node_count()));
            }
        }
    }
    lines.join("\n")
}

/// One-line summary of a command result.
pub fn describe_event(event: &MappingEvent) -> String {
    match event {
        MappingEvent::Assigned {
            source,
            dest,
            evicted_source,
            ..
        } => match evicted_source {
            Some(evicted) => format!("Mapped {source} → {dest} (unmapped {evicted})"),
            None => format!("Mapped {source} → {dest}"),
        },
        MappingEvent::Unassigned { source, dest } => format!("Unmapped {source} (was {dest})"),
        MappingEvent::Skipped { source, .. } => format!("Skipped {source}"),
        MappingEvent::Unskipped { source } => format!("Unskipped {source}"),
        MappingEvent::Swapped {
            source_a, source_b, ..
        } => format!("Swapped {source_a} and {source_b}"),
        MappingEvent::Rematched { assigned } => format!("Re-matched {assigned} source(s)"),
        MappingEvent::Batch { description, events } => {
            format!("{description} ({} change(s))", events.iter().filter(|e| !e.is_noop()).count())
        }
        MappingEvent::NoOp { reason } => format!("No change: {reason}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::settings::MapperSettings;

    #[test]
    fn session_summary_mentions_phase_and_coverage() {
        let sources = vec![Entity::model("Arch 1", 50).with_effects(5), Entity::model("Flood", 3)];
        let dests = vec![Entity::model("Arch 1", 50)];
        let mut session = MappingSession::new("Carol", sources, dests, MapperSettings::default());
        let text = describe_session(&mut session);
        assert!(text.starts_with("Session: Carol"));
        assert!(text.contains(" > Individuals"));
        assert!(text.contains("Display coverage: 100%"));
        assert!(text.contains("Unresolved in Individuals (1)"));
        assert!(text.contains("  - Flood"));
    }

    #[test]
    fn entity_listing_groups_by_type() {
        let entities = vec![
            Entity::model("Arch 1", 50),
            Entity::group("Arches", ["Arch 1"]),
        ];
        let text = describe_entities(&entities);
        assert!(text.contains("Model (1)\n  - Arch 1 (50 nodes)"));
        assert!(text.contains("Model group (1)\n  - Arches (1 members)"));
    }

    #[test]
    fn noop_event_reads_as_no_change() {
        let event = MappingEvent::NoOp {
            reason: "'X' is not mapped".into(),
        };
        assert_eq!(describe_event(&event), "No change: 'X' is not mapped");
    }
}
