use std::thread;
use toffee::prelude::*;

/// 1000 particles stream across the subdomain boundaries of four ranks and
/// back. The exchange must conserve the particle count, the total mass and
/// the tag multiset.
#[test]
fn migration_round_trip_conserves_particles() {
    let universes = Universe::cluster(4);
    let handles: Vec<_> = universes
        .into_iter()
        .map(|uni| {
            thread::spawn(move || {
                let domain = Domain::new(1, [0.0; 3], [40.0, 0.0, 0.0], 1.0).unwrap();
                let mut sim = Simulation::new(uni, domain).unwrap();
                sim.create_scheme(&["musl"]).unwrap();
                sim.create_method(&["ulmpm", "PIC", "linear"]).unwrap();
                sim.set_dt(0.1).unwrap();

                let seeds: Vec<(Vector, Real)> = (0..1000)
                    .map(|i| (Vector::new(5.0 + 10.0 * i as Real / 1000.0, 0.0, 0.0), 0.01))
                    .collect();
                sim.add_solid("stream", Material::fluid(EosLinear::new(1.0, 0.0)), &seeds)
                    .unwrap();

                let drift = |sim: &mut Simulation, vx: Real| {
                    let solid = &mut sim.state.solids[0];
                    for ip in 0..solid.np_local {
                        solid.v[ip] = Vector::new(vx, 0.0, 0.0);
                    }
                };

                // Downstream for 100 steps, then back.
                drift(&mut sim, 1.0);
                sim.run(100).unwrap();
                drift(&mut sim, -1.0);
                sim.run(100).unwrap();

                let solid = &sim.state.solids[0];
                let mut tags: Vec<usize> = solid.ptag[..solid.np_local].to_vec();
                tags.sort_unstable();
                (solid.np_local, sim.local_mass(), tags)
            })
        })
        .collect();

    let mut total_np = 0;
    let mut total_mass = 0.0;
    let mut all_tags = vec![];
    for h in handles {
        let (np_local, mass, tags) = h.join().unwrap();
        total_np += np_local;
        total_mass += mass;
        all_tags.extend(tags);
    }

    assert_eq!(total_np, 1000);
    assert!((total_mass - 10.0).abs() < 1.0e-9);
    all_tags.sort_unstable();
    let expected: Vec<usize> = (1..=1000).collect();
    assert_eq!(all_tags, expected, "tag multiset changed across migration");
}

/// A particle leaving the global box is a loud loss, not a silent drop.
#[test]
fn leaving_the_global_box_is_fatal() {
    let universe = Universe::single();
    let domain = Domain::new(1, [0.0; 3], [10.0, 0.0, 0.0], 1.0).unwrap();
    let mut sim = Simulation::new(universe, domain).unwrap();
    sim.create_method(&["ulmpm", "PIC", "linear"]).unwrap();
    sim.set_dt(0.5).unwrap();

    let seeds = vec![(Vector::new(9.4, 0.0, 0.0), 0.1)];
    sim.add_solid("runaway", Material::fluid(EosLinear::new(1.0, 0.0)), &seeds)
        .unwrap();
    sim.state.solids[0].v[0] = Vector::new(4.0, 0.0, 0.0);

    let result = sim.run(10);
    match result {
        Err(MpmError::DomainLoss { tag, .. }) => assert_eq!(tag, 1),
        other => panic!("expected a domain-loss error, got {:?}", other.err()),
    }
}
