use toffee::prelude::*;

/// The total-Lagrangian formulation gives every solid its own grid, keeps
/// its reference-configuration weights for the whole run, and conserves
/// momentum like the updated formulation.
#[test]
fn total_lagrangian_blocks_conserve_momentum() {
    let universe = Universe::single();
    let domain = Domain::new(2, [0.0; 3], [8.0, 8.0, 0.0], 1.0).unwrap();
    let mut sim = Simulation::new(universe, domain).unwrap();
    sim.create_scheme(&["musl"]).unwrap();
    sim.create_method(&["tlmpm", "PIC", "quadratic-spline"]).unwrap();
    sim.set_dt(1.0e-4).unwrap();

    let (_, g) = lame_lambda_mu(1.0e6, 0.3);
    let k = bulk_modulus(1.0e6, 0.3);
    let block = |x0: Real, y0: Real| {
        let mut seeds = vec![];
        for i in 0..4 {
            for j in 0..4 {
                seeds.push((
                    Vector::new(x0 + 0.5 * i as Real, y0 + 0.5 * j as Real, 0.0),
                    0.25,
                ));
            }
        }
        seeds
    };
    sim.add_solid(
        "left",
        Material::elastic(EosLinear::new(1000.0, k), StrengthLinearElastic::new(g)),
        &block(1.25, 3.25),
    )
    .unwrap();
    sim.add_solid(
        "right",
        Material::elastic(EosLinear::new(1000.0, k), StrengthLinearElastic::new(g)),
        &block(5.25, 3.25),
    )
    .unwrap();

    // One grid per solid in the total-Lagrangian formulation.
    assert_eq!(sim.state.grids.len(), 2);

    let mut p0 = Vector::zeros();
    for solid in &mut sim.state.solids {
        for ip in 0..solid.np_local {
            solid.v[ip] = Vector::new(0.1, 0.02 * ((ip % 3) as Real - 1.0), 0.0);
            p0 += solid.v[ip] * solid.mass[ip];
        }
    }

    sim.run(10).unwrap();

    let mut p1 = Vector::zeros();
    for solid in &sim.state.solids {
        assert_eq!(solid.np_local, 16);
        for ip in 0..solid.np_local {
            p1 += solid.v[ip] * solid.mass[ip];
            assert!(solid.def_grad[ip].determinant() > 0.0);
        }
        // Reference weights were built once and reused.
        assert!(!solid.wf_pn[0].is_empty());
        let wf_sum: Real = solid.wf_pn[0].iter().sum();
        assert!((wf_sum - 1.0).abs() < 1.0e-12);
    }
    assert!(
        (p1 - p0).norm() < 1.0e-9 * p0.norm(),
        "momentum drifted from {:?} to {:?}",
        p0,
        p1
    );
}

/// The updated-Lagrangian formulation shares one background grid between
/// all solids.
#[test]
fn updated_lagrangian_shares_the_grid() {
    let universe = Universe::single();
    let domain = Domain::new(2, [0.0; 3], [8.0, 8.0, 0.0], 1.0).unwrap();
    let mut sim = Simulation::new(universe, domain).unwrap();
    sim.create_method(&["ulmpm", "PIC", "linear"]).unwrap();
    sim.set_dt(1.0e-4).unwrap();

    let seeds_a = vec![(Vector::new(2.2, 2.2, 0.0), 0.1)];
    let seeds_b = vec![(Vector::new(5.7, 5.7, 0.0), 0.1)];
    sim.add_solid("a", Material::fluid(EosLinear::new(1000.0, 1.0e5)), &seeds_a)
        .unwrap();
    sim.add_solid("b", Material::fluid(EosLinear::new(1000.0, 1.0e5)), &seeds_b)
        .unwrap();

    assert_eq!(sim.state.grids.len(), 1);
    assert_eq!(sim.state.solids[0].grid, sim.state.solids[1].grid);

    sim.run(2).unwrap();
    // Both solids contributed to the shared nodal mass.
    let nodal_mass: Real = sim.state.grids[0].mass.iter().sum();
    let particle_mass = sim.local_mass();
    assert!((nodal_mass - particle_mass).abs() < 1.0e-9 * particle_mass);
}
