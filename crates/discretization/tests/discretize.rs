use std::f64::consts::PI;

use approx::assert_relative_eq;
use nalgebra::DVector;
use volta_core::{DaeProblem, Direction, sparse};
use volta_discretization::{
    CoordinateSystem, DiscretizationError, DomainGeometry, Geometry, Mesh, MeshPoints, SubMesh,
    discretize,
};
use volta_symbolic::{
    BoundaryCondition, BoundaryConditions, Domain, Equation, EquationKind, Event, Inputs, Symbol,
    System,
};

fn mesh(cells: usize) -> Mesh {
    let geometry = Geometry::new().with("x", DomainGeometry::cartesian(0.0, 1.0));
    Mesh::new(&geometry, &MeshPoints::from([("x".to_owned(), cells)])).unwrap()
}

fn c() -> Symbol {
    Symbol::variable("c", Domain::from("x"))
}

/// `dc/dt = ∇²c` on [0, 1] with the given boundary conditions.
fn diffusion(bcs: Option<BoundaryConditions>) -> System {
    let mut system = System::default();
    system.equations.insert(
        "c".into(),
        Equation {
            variable: c(),
            expression: c().gradient().unwrap().divergence().unwrap(),
            kind: EquationKind::Differential,
        },
    );
    system.initial_conditions.insert("c".into(), Symbol::scalar(1.0));
    if let Some(bcs) = bcs {
        system.boundary_conditions.insert(c(), bcs);
    }
    system
}

fn dirichlet(left: f64, right: f64) -> Option<BoundaryConditions> {
    Some(BoundaryConditions::new(
        BoundaryCondition::dirichlet(left),
        BoundaryCondition::dirichlet(right),
    ))
}

fn state(mesh: &Mesh, f: impl Fn(f64) -> f64) -> DVector<f64> {
    let nodes = mesh.combine(&Domain::from("x")).unwrap();
    DVector::from_iterator(nodes.cells(), nodes.nodes().iter().map(|x| f(*x)))
}

#[test]
fn gradient_of_a_linear_field_is_exact() {
    let mesh = mesh(10);
    let mut system = diffusion(dirichlet(1.0, 3.0));
    system.outputs.insert("flux".into(), c().gradient().unwrap());

    let model = discretize(&system, &mesh).unwrap();
    let y = state(&mesh, |x| 1.0 + 2.0 * x);
    let flux = model
        .evaluate_output("flux", 0.0, &y, &Inputs::new())
        .unwrap()
        .unwrap();

    assert_eq!(flux.len(), 11);
    for value in flux.iter() {
        assert_relative_eq!(value, 2.0, epsilon = 1e-10);
    }

    // A linear profile is steady.
    let rhs = model.rhs(0.0, &y, &Inputs::new()).unwrap();
    assert!(rhs.amax() < 1e-9);
}

#[test]
fn laplacian_error_shrinks_with_refinement() {
    let error = |cells| {
        let mesh = mesh(cells);
        let model = discretize(&diffusion(dirichlet(0.0, 0.0)), &mesh).unwrap();
        let y = state(&mesh, |x| (PI * x).sin());
        let exact = state(&mesh, |x| -PI * PI * (PI * x).sin());
        (model.rhs(0.0, &y, &Inputs::new()).unwrap() - exact).amax()
    };

    let coarse = error(10);
    let fine = error(40);
    assert!(fine < coarse, "coarse {coarse}, fine {fine}");
}

#[test]
fn simplified_laplacian_matches_divergence_of_gradient() {
    let mesh = mesh(8);
    let mut fused = diffusion(dirichlet(0.5, 2.0));
    fused.equations["c"].expression = c().laplacian().unwrap();

    let y = state(&mesh, |x| x * x);
    let a = discretize(&diffusion(dirichlet(0.5, 2.0)), &mesh).unwrap();
    let b = discretize(&fused, &mesh).unwrap();

    let (ra, rb) = (
        a.rhs(0.0, &y, &Inputs::new()).unwrap(),
        b.rhs(0.0, &y, &Inputs::new()).unwrap(),
    );
    assert_relative_eq!(ra, rb, epsilon = 1e-9);
}

#[test]
fn jacobian_of_a_linear_operator_reproduces_it() {
    let mesh = mesh(6);
    let model = discretize(&diffusion(dirichlet(0.0, 0.0)), &mesh).unwrap();
    let inputs = Inputs::new();
    let problem = model.bind(&inputs);

    let y = state(&mesh, |x| x.cos());
    let jac = problem.rhs_jacobian(0.0, &y).unwrap();
    let f = problem.rhs(0.0, &y).unwrap();

    assert_relative_eq!(sparse::mul_vec(&jac, &y), f, epsilon = 1e-9);
    assert_eq!(problem.algebraic_rows(), Vec::<usize>::new());
    assert_relative_eq!(problem.initial_state().unwrap(), DVector::from_element(6, 1.0));
}

#[test]
fn missing_boundary_condition_names_the_side() {
    let err = discretize(&diffusion(None), &mesh(4)).unwrap_err();
    assert!(matches!(
        err,
        DiscretizationError::BoundaryConditionMissing { side: volta_symbolic::Side::Left, .. }
    ));

    let half = Some(BoundaryConditions {
        left: Some(BoundaryCondition::neumann(0.0)),
        right: None,
    });
    let err = discretize(&diffusion(half), &mesh(4)).unwrap_err();
    assert!(matches!(
        err,
        DiscretizationError::BoundaryConditionMissing { side: volta_symbolic::Side::Right, .. }
    ));
}

#[test]
fn layout_puts_algebraic_rows_last() {
    let v = Symbol::variable("v", Domain::empty());
    let mut system = System::default();
    system.equations.insert(
        "v".into(),
        Equation {
            variable: v.clone(),
            expression: v.clone().sub(c().integral().unwrap()).unwrap(),
            kind: EquationKind::Algebraic,
        },
    );
    let diffusion = diffusion(dirichlet(0.0, 0.0));
    system.equations.extend(diffusion.equations);
    system.initial_conditions.extend(diffusion.initial_conditions);
    system.boundary_conditions.extend(diffusion.boundary_conditions);
    system.initial_conditions.insert("v".into(), Symbol::scalar(1.0));

    let model = discretize(&system, &mesh(5)).unwrap();

    assert_eq!(model.slot("c").unwrap().range(), 0..5);
    assert_eq!(model.slot("v").unwrap().range(), 5..6);
    assert_eq!(sparse::diagonal_of(model.mass_matrix()), vec![1., 1., 1., 1., 1., 0.]);

    // The integral of a unit profile over [0, 1] is one.
    let y = DVector::from_element(6, 1.0);
    assert_relative_eq!(model.rhs(0.0, &y, &Inputs::new()).unwrap()[5], 0.0, epsilon = 1e-12);
}

#[test]
fn events_must_be_scalar() {
    let mut system = diffusion(dirichlet(0.0, 0.0));
    system.events.push(Event {
        name: "low".into(),
        expression: c(),
        direction: Direction::Decreasing,
    });
    assert!(matches!(
        discretize(&system, &mesh(3)),
        Err(DiscretizationError::NonScalarEvent { name }) if name == "low"
    ));

    system.events[0].expression = c().minimum().sub(0.5).unwrap();
    let model = discretize(&system, &mesh(3)).unwrap();
    let y = DVector::from_vec(vec![0.9, 0.7, 0.8]);
    let values = model.event_values(0.0, &y, &Inputs::new()).unwrap();
    assert_relative_eq!(values[0], 0.2, epsilon = 1e-12);
}

#[test]
fn parameters_must_be_resolved_first() {
    let mut system = diffusion(dirichlet(0.0, 0.0));
    system.equations["c"].expression = c().mul(Symbol::parameter("k")).unwrap();

    assert!(matches!(
        discretize(&system, &mesh(3)),
        Err(DiscretizationError::UnresolvedParameter { name }) if name == "k"
    ));
}

#[test]
fn node_values_move_to_edges_when_mixed_with_fluxes() {
    let mesh = mesh(5);
    let mut system = diffusion(dirichlet(1.0, 1.0));
    // ∇·(c ∇c) mixes a node operand with an edge operand.
    system.equations["c"].expression = c()
        .mul(c().gradient().unwrap())
        .unwrap()
        .divergence()
        .unwrap();

    let model = discretize(&system, &mesh).unwrap();
    let rhs = model
        .rhs(0.0, &DVector::from_element(5, 1.0), &Inputs::new())
        .unwrap();
    assert_eq!(rhs.len(), 5);
    assert!(rhs.amax() < 1e-12);
}

#[test]
fn divergence_of_node_values_is_unsupported() {
    let mut system = diffusion(dirichlet(0.0, 0.0));
    system.equations["c"].expression = c().divergence().unwrap();

    assert!(matches!(
        discretize(&system, &mesh(3)),
        Err(DiscretizationError::UnsupportedOperator { .. })
    ));
}

#[test]
fn cylindrical_meshes_have_no_divergence() {
    let submesh =
        SubMesh::from_edges(vec![0.0, 0.5, 1.0], CoordinateSystem::CylindricalPolar).unwrap();
    let mesh = Mesh::from_submeshes([("x".to_owned(), submesh)].into_iter().collect());

    assert!(matches!(
        discretize(&diffusion(dirichlet(0.0, 0.0)), &mesh),
        Err(DiscretizationError::UnsupportedOperator { .. })
    ));
}

#[test]
fn spherical_integral_is_the_ball_volume() {
    let r = Symbol::variable("r", Domain::from("particle"));
    let mut system = System::default();
    system.equations.insert(
        "r".into(),
        Equation {
            variable: r.clone(),
            expression: Symbol::scalar(0.0),
            kind: EquationKind::Differential,
        },
    );
    system.initial_conditions.insert("r".into(), Symbol::scalar(1.0));
    system.outputs.insert("volume".into(), r.integral().unwrap());

    let geometry = Geometry::new().with("particle", DomainGeometry::spherical(0.0, 1.0));
    let mesh = Mesh::new(&geometry, &MeshPoints::from([("particle".to_owned(), 7)])).unwrap();
    let model = discretize(&system, &mesh).unwrap();

    let y = model.initial_state(&Inputs::new()).unwrap();
    let volume = model
        .evaluate_output("volume", 0.0, &y, &Inputs::new())
        .unwrap()
        .unwrap();
    assert_relative_eq!(volume.as_scalar().unwrap(), 4.0 * PI / 3.0, epsilon = 1e-12);
}

#[test]
fn boundary_values_prefer_dirichlet_conditions() {
    let mesh = mesh(4);
    let mut system = diffusion(Some(BoundaryConditions::new(
        BoundaryCondition::neumann(0.0),
        BoundaryCondition::dirichlet(7.0),
    )));
    system.outputs.insert(
        "left".into(),
        c().boundary_value(volta_symbolic::Side::Left).unwrap(),
    );
    system.outputs.insert(
        "right".into(),
        c().boundary_value(volta_symbolic::Side::Right).unwrap(),
    );

    let model = discretize(&system, &mesh).unwrap();
    let y = state(&mesh, |x| 2.0 + x);
    let eval = |name| {
        model
            .evaluate_output(name, 0.0, &y, &Inputs::new())
            .unwrap()
            .unwrap()
            .as_scalar()
            .unwrap()
    };

    assert_relative_eq!(eval("left"), 2.0, epsilon = 1e-12);
    assert_relative_eq!(eval("right"), 7.0);
}
