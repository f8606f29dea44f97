//! The six literal end-to-end scenarios from the registry's design spec.

use archetype_ecs::{EcsError, Registry};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

#[test]
fn scenario_1_integrate_velocity_then_collect_positions() {
    let mut reg = Registry::new();
    let mut handles = Vec::new();
    for i in 0..100 {
        let i = i as f32;
        handles.push(
            reg.create((
                Position { x: i, y: 1.5 * i },
                Velocity { x: 0.3 * i, y: -5.0 * i },
            ))
            .unwrap(),
        );
    }

    let view = reg.view_mut::<(&mut Position, &Velocity)>().unwrap();
    view.for_each(|_, (pos, vel)| {
        pos.x += vel.x;
        pos.y += vel.y;
    });

    let view = reg.view::<(&Position,)>().unwrap();
    let mut collected = Vec::new();
    view.for_each(|entity, (pos,)| collected.push((entity, *pos)));
    collected.sort_by_key(|(e, _)| e.id);

    assert_eq!(collected.len(), 100);
    for (i, (entity, pos)) in collected.iter().enumerate() {
        assert_eq!(*entity, handles[i]);
        let i = i as f32;
        let expected = Position {
            x: i + 0.3 * i,
            y: 1.5 * i - 5.0 * i,
        };
        assert!((pos.x - expected.x).abs() < 1e-3);
        assert!((pos.y - expected.y).abs() < 1e-3);
    }

    assert_eq!(collected[0].1, Position { x: 0.0, y: 0.0 });
    assert!((collected[1].1.x - 1.3).abs() < 1e-3);
    assert!((collected[1].1.y - -3.5).abs() < 1e-3);
}

#[test]
fn scenario_2_set_then_remove_round_trips_the_archetype() {
    let mut reg = Registry::new();
    let e = reg.create((Position { x: 1.0, y: 2.0 },)).unwrap();

    assert!(!reg.has::<Velocity>(e).unwrap());

    reg.set(e, Velocity { x: 3.0, y: 4.0 }).unwrap();
    assert!(reg.has::<Velocity>(e).unwrap());
    assert_eq!(*reg.get::<Position>(e).unwrap(), Position { x: 1.0, y: 2.0 });

    reg.remove::<Velocity>(e).unwrap();
    assert!(!reg.has::<Velocity>(e).unwrap());
    assert_eq!(*reg.get::<Position>(e).unwrap(), Position { x: 1.0, y: 2.0 });
}

#[test]
fn scenario_3_entity_pool_recycles_with_bumped_generation() {
    let mut reg = Registry::new();
    let h1 = reg.create((Position { x: 0.0, y: 0.0 },)).unwrap();
    let _h2 = reg.create((Position { x: 0.0, y: 0.0 },)).unwrap();
    reg.destroy(h1).unwrap();
    let h3 = reg.create((Position { x: 0.0, y: 0.0 },)).unwrap();

    assert_eq!(h3.id, h1.id);
    assert_eq!(h3.generation, h1.generation + 1);
    assert!(!reg.alive(h1));
    assert!(reg.alive(h3));
}

#[test]
fn scenario_4_view_with_conflicting_refs_is_rejected_at_construction() {
    let mut reg = Registry::new();
    let err = reg.view_mut::<(&mut Position, &mut Position)>();
    assert_eq!(err.err(), Some(EcsError::AliasingViolation));
}

#[test]
fn scenario_5_splitting_an_archetype_in_two_yields_correct_view_counts() {
    #[derive(Debug, Clone, Copy)]
    struct A(u32);
    #[derive(Debug, Clone, Copy)]
    struct B(u32);

    let mut reg = Registry::new();
    let mut handles = Vec::new();
    for i in 0..10_000 {
        handles.push(reg.create((A(i),)).unwrap());
    }
    for (i, &e) in handles.iter().enumerate() {
        if i % 2 == 0 {
            reg.set(e, B(i as u32)).unwrap();
        }
    }

    assert_eq!(reg.archetype_count(), 3); // empty, {A}, {A,B}

    let view_a = reg.view::<(&A,)>().unwrap();
    assert_eq!(view_a.len(), 10_000);

    let view_ab = reg.view::<(&A, &B)>().unwrap();
    assert_eq!(view_ab.len(), 5_000);
}

#[test]
fn scenario_6_destroying_first_entity_in_a_full_chunk_relocates_the_last() {
    // A small chunk budget forces several rows per chunk so the first entity
    // created actually shares a chunk with later ones.
    let per_row = std::mem::size_of::<archetype_ecs::EntityHandle>() + std::mem::size_of::<Position>();
    let mut reg = Registry::with_chunk_size(per_row * 4);

    let mut handles = Vec::new();
    for i in 0..4 {
        handles.push(reg.create((Position { x: i as f32, y: 0.0 },)).unwrap());
    }

    let first = handles[0];
    let last = *handles.last().unwrap();
    reg.destroy(first).unwrap();

    assert!(reg.alive(last));
    assert_eq!(*reg.get::<Position>(last).unwrap(), Position { x: 3.0, y: 0.0 });
    assert!(!reg.alive(first));
}
