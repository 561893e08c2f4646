use serde::Serialize;

use crate::auth::permissions::{Action, DASHBOARD_VIEW, Entity};
use crate::auth::user::User;

/// One node of the static sidebar config. Headers carry no route and no
/// capability of their own; they survive only while at least one child does.
#[derive(Debug)]
pub struct NavNode {
    pub name: &'static str,
    pub icon: &'static str,
    pub route: Option<&'static str>,
    pub capability: Option<&'static str>,
    pub children: &'static [NavNode],
}

pub const SIDEBAR: &[NavNode] = &[
    NavNode {
        name: "Dashboard",
        icon: "fas fa-tachometer-alt",
        route: Some("dashboard"),
        capability: Some(DASHBOARD_VIEW),
        children: &[],
    },
    NavNode {
        name: "Account Management",
        icon: "",
        route: None,
        capability: None,
        children: &[
            NavNode {
                name: "Groups",
                icon: "far fa-user",
                route: Some("groups"),
                capability: Some(Entity::Group.capability(Action::View)),
                children: &[],
            },
            NavNode {
                name: "Staffs",
                icon: "far fa-user",
                route: Some("staffs"),
                capability: Some(Entity::Staff.capability(Action::View)),
                children: &[],
            },
            NavNode {
                name: "Students",
                icon: "far fa-user",
                route: Some("students"),
                capability: Some(Entity::Student.capability(Action::View)),
                children: &[],
            },
            NavNode {
                name: "Instructors",
                icon: "far fa-user",
                route: Some("instructors"),
                capability: Some(Entity::Instructor.capability(Action::View)),
                children: &[],
            },
        ],
    },
    NavNode {
        name: "Course Management",
        icon: "",
        route: None,
        capability: None,
        children: &[NavNode {
            name: "Courses",
            icon: "far fa-user",
            route: Some("courses"),
            capability: Some(Entity::Course.capability(Action::View)),
            children: &[],
        }],
    },
    NavNode {
        name: "Enrollment Management",
        icon: "",
        route: None,
        capability: None,
        children: &[NavNode {
            name: "Enrollments",
            icon: "far fa-user",
            route: Some("enrollments"),
            capability: Some(Entity::Enrollment.capability(Action::View)),
            children: &[],
        }],
    },
    NavNode {
        name: "MetaData Info",
        icon: "",
        route: None,
        capability: None,
        children: &[NavNode {
            name: "Metadata",
            icon: "far fa-user",
            route: Some("metadata"),
            capability: Some(Entity::Metadata.capability(Action::View)),
            children: &[],
        }],
    },
];

/// Route-name to mounted-path table. A name missing here simply renders the
/// leaf inactive; it is not an error.
fn resolve_route(name: &str) -> Option<&'static str> {
    match name {
        "dashboard" => Some("/api/dashboard"),
        "groups" => Some("/api/groups"),
        "staffs" => Some("/api/staffs"),
        "students" => Some("/api/students"),
        "instructors" => Some("/api/instructors"),
        "courses" => Some("/api/courses"),
        "enrollments" => Some("/api/enrollments"),
        "metadata" => Some("/api/metadata"),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
pub struct NavItem {
    pub name: &'static str,
    pub icon: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<&'static str>,
    pub active: bool,
    pub has_children: bool,
    pub children: Vec<NavItem>,
}

/// Filters the sidebar down to what `user` may see, marking the branch
/// containing `current_path` active. Pure function over the static tree.
pub fn visible_menu(user: &User, current_path: &str) -> Vec<NavItem> {
    filter_nodes(SIDEBAR, user, current_path)
}

fn filter_nodes(nodes: &'static [NavNode], user: &User, current_path: &str) -> Vec<NavItem> {
    let mut visible = Vec::new();

    for node in nodes {
        if let Some(capability) = node.capability {
            if !user.has_capability(capability) {
                continue;
            }
        }

        if !node.children.is_empty() {
            let children = filter_nodes(node.children, user, current_path);
            if children.is_empty() {
                // A header with nothing visible under it disappears.
                continue;
            }
            let active = children.iter().any(|child| child.active);
            visible.push(NavItem {
                name: node.name,
                icon: node.icon,
                url: None,
                active,
                has_children: true,
                children,
            });
        } else {
            let url = node.route.and_then(resolve_route);
            let active = url.is_some_and(|url| current_path.starts_with(url));
            visible.push(NavItem {
                name: node.name,
                icon: node.icon,
                url,
                active,
                has_children: false,
                children: Vec::new(),
            });
        }
    }

    visible
}
